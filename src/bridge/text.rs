//! Message body transcoding between Slack and Matrix text.
//!
//! Slack escapes `&`, `<` and `>` as HTML entities and uses `<...>` for
//! links and commands. Matrix bodies are plain text.

use std::sync::LazyLock;

use fancy_regex::Regex;

/// Cheap precheck: only run the emoji scanner if something looks like a shortcode.
static SHORTCODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":[^:\s]*:").unwrap());

/// Convert a Matrix body into Slack text.
pub fn matrix_to_slack(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Convert Slack text into a Matrix body.
///
/// Link and command markup is rewritten first, while any literal brackets
/// the user typed are still entity-escaped, so they are never mistaken for
/// markup.
pub fn slack_to_matrix(text: &str) -> String {
    let text = rewrite_markup(text);
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    if SHORTCODE_PATTERN.is_match(&text).unwrap_or(false) {
        rewrite_emoji(&text)
    } else {
        text
    }
}

/// Rewrite every `<payload>` span in one left-to-right pass.
///
/// Rewritten output is appended and never scanned again.
fn rewrite_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        let Some(len) = rest[open + 1..].find('>') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&render_directive(&rest[open + 1..open + 1 + len]));
        rest = &rest[open + 1 + len + 1..];
    }

    out.push_str(rest);
    out
}

fn render_directive(payload: &str) -> String {
    if let Some(command) = payload.strip_prefix('!') {
        let shown = match command.split_once('|') {
            Some((_, caption)) => caption,
            None => command,
        };
        return format!("<{}>", shown);
    }

    match payload.split_once('|') {
        Some((link, "")) => link.to_string(),
        Some((link, caption)) => format!("{} ( {} )", caption, link),
        None => payload.to_string(),
    }
}

/// Substitute known `:shortcode:` tokens with their glyphs.
fn rewrite_emoji(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find(':') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find(|c: char| c == ':' || c.is_whitespace()) {
            Some(end) if after[end..].starts_with(':') => {
                let name = &after[..end];
                match emojis::get_by_shortcode(name) {
                    Some(emoji) => {
                        out.push_str(emoji.as_str());
                        rest = &after[end + 1..];
                    }
                    None => {
                        // The closing colon may open the next shortcode.
                        out.push(':');
                        out.push_str(name);
                        rest = &after[end..];
                    }
                }
            }
            Some(end) => {
                out.push(':');
                out.push_str(&after[..end]);
                rest = &after[end..];
            }
            None => {
                out.push(':');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
