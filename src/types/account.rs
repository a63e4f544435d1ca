use crate::types::subscription::Subscriptions;
use serde::{Deserialize, Serialize};

pub type AccountId = i64;

/// Persisted account row, as returned by the account repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub bearer_token: String,
    /// Empty until the first successful pairing.
    pub network_address: String,
    pub webhook_url: String,
    /// Base64 QR data URL, non-empty only while a pairing attempt is pending.
    pub qr_payload: String,
    /// Whether the account should be reconnected on process start.
    pub connected: bool,
    /// Comma-separated event kinds, `All` for everything.
    pub subscribed_events: String,
}

impl Account {
    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::from_csv(&self.subscribed_events)
    }
}

/// Token-keyed summary of the fields the session core needs on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub account_id: AccountId,
    pub network_address: String,
    pub webhook_url: String,
    pub bearer_token: String,
    pub subscribed_events: Subscriptions,
}

impl From<&Account> for IdentitySnapshot {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            network_address: account.network_address.clone(),
            webhook_url: account.webhook_url.clone(),
            bearer_token: account.bearer_token.clone(),
            subscribed_events: account.subscriptions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub logged_in: bool,
}
