//! Bridge core: link stores, identity provisioning and message routing.
//!
//! ## Module Structure
//!
//! - `rooms`: Slack channel to Matrix room links, with the delivery watermark
//! - `users`: Slack user to Matrix user links
//! - `provisioner`: Ghost and puppet creation for unlinked senders
//! - `orchestrator`: Main bridge orchestrator (`Bridge` struct)
//! - `text`: Message body transcoding

pub mod clients;
pub mod orchestrator;
pub mod provisioner;
pub mod rooms;
pub mod text;
pub mod users;

#[cfg(test)]
pub mod testing;

pub use clients::{ClientFactory, HttpClientFactory};
pub use orchestrator::Bridge;
pub use provisioner::Provisioner;
pub use rooms::RoomLinks;
pub use users::UserLinks;
