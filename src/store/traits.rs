use crate::types::account::{Account, AccountId};
use crate::types::jid::Jid;
use anyhow::Result;
use async_trait::async_trait;

/// The narrow slice of the account table the session core reads and writes.
///
/// Every setter writes an absolute value so the control plane and the event
/// dispatcher can race on the same row without coordination.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_connected_accounts(&self) -> Result<Vec<Account>>;
    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>>;
    async fn get_by_token(&self, token: &str) -> Result<Option<Account>>;
    async fn set_connected(&self, id: AccountId, connected: bool) -> Result<()>;
    async fn set_network_address(&self, id: AccountId, address: &Jid) -> Result<()>;
    async fn set_qr_payload(&self, id: AccountId, payload: &str) -> Result<()>;
    async fn set_subscribed_events(&self, id: AccountId, csv: &str) -> Result<()>;
    async fn set_webhook(&self, id: AccountId, url: &str) -> Result<()>;
}
