//! Common utilities and types shared across the application.

pub mod echo;
pub mod error;

pub use echo::EchoSuppresser;
pub use error::{ClientError, ClientResult, ProvisionError, StoreError, StoreResult};
