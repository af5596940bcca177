//! Matrix side of the bridge: client-server API client, events and receive loop.

pub mod client;
pub mod events;
pub mod listener;
pub mod user;

pub use client::{HttpMatrixClient, MatrixClient};
pub use events::{Content, Image, ImageInfo, RoomMessage};
pub use listener::MatrixListener;
pub use user::{MatrixUser, MatrixUsers};
