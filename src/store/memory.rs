use crate::store::traits::AccountRepository;
use crate::types::account::{Account, AccountId};
use crate::types::jid::Jid;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Account table kept in process memory.
///
/// Useful for embedding the gateway without a relational store and as the
/// reference behaviour of [`AccountRepository`].
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<BTreeMap<AccountId, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts.lock().await.insert(account.id, account);
    }

    async fn update<F>(&self, id: AccountId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Account),
    {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| anyhow!("account {id} not found"))?;
        f(account);
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountStore {
    async fn get_connected_accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .filter(|a| a.connected)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|a| a.bearer_token == token)
            .cloned())
    }

    async fn set_connected(&self, id: AccountId, connected: bool) -> Result<()> {
        self.update(id, |a| a.connected = connected).await
    }

    async fn set_network_address(&self, id: AccountId, address: &Jid) -> Result<()> {
        let address = address.to_string();
        self.update(id, |a| a.network_address = address).await
    }

    async fn set_qr_payload(&self, id: AccountId, payload: &str) -> Result<()> {
        self.update(id, |a| a.qr_payload = payload.to_string()).await
    }

    async fn set_subscribed_events(&self, id: AccountId, csv: &str) -> Result<()> {
        self.update(id, |a| a.subscribed_events = csv.to_string())
            .await
    }

    async fn set_webhook(&self, id: AccountId, url: &str) -> Result<()> {
        self.update(id, |a| a.webhook_url = url.to_string()).await
    }
}
