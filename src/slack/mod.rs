//! Slack side of the bridge: Web API client, RTM events and receive loop.

pub mod client;
pub mod events;
pub mod listener;
pub mod members;

pub use client::{HttpSlackClient, SlackClient};
pub use events::Message;
pub use listener::SlackListener;
pub use members::{ChannelMembers, SlackUser};
