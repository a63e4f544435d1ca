// Data model and collaborator contracts
pub mod protocol;
pub mod store;
pub mod types {
    pub mod account;
    pub mod events;
    pub mod jid;
    pub mod subscription;
}

// Session core
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod identity_cache;
pub mod media;
pub mod qrcode;
pub mod registry;
pub mod session;
pub mod startup;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{ConnectOptions, Gateway, GatewayBuilder};
pub use types::account::{Account, AccountId, ConnectionStatus, IdentitySnapshot};
pub use types::subscription::{EventKind, Subscriptions};
