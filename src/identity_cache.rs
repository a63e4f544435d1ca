//! Short-lived token → identity mapping.
//!
//! Entries expire after the configured TTL; moka's own maintenance sweeps
//! expired entries, so no sweep task is run here. There is no cross
//! invalidation on account edits made elsewhere: a stale entry lives at most
//! one TTL.

use crate::types::account::IdentitySnapshot;
use crate::types::jid::Jid;
use crate::types::subscription::Subscriptions;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;

const MAX_CACHED_IDENTITIES: u64 = 100_000;

#[derive(Clone)]
pub struct IdentityCache {
    entries: Cache<String, IdentitySnapshot>,
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(MAX_CACHED_IDENTITIES)
                .build(),
        }
    }

    pub async fn get(&self, token: &str) -> Option<IdentitySnapshot> {
        self.entries.get(token).await
    }

    pub async fn set(&self, token: &str, snapshot: IdentitySnapshot) {
        self.entries.insert(token.to_string(), snapshot).await;
    }

    /// Rewrites the address of a cached entry, keeping its webhook and
    /// subscriptions. Returns `false` when nothing was cached for `token`.
    pub async fn refresh_address(&self, token: &str, address: &Jid) -> bool {
        let address = address.to_string();
        self.update(token, move |snapshot| snapshot.network_address = address)
            .await
    }

    pub async fn refresh_webhook(&self, token: &str, url: &str) -> bool {
        let url = url.to_string();
        self.update(token, move |snapshot| snapshot.webhook_url = url)
            .await
    }

    pub async fn refresh_subscriptions(&self, token: &str, events: Subscriptions) -> bool {
        self.update(token, move |snapshot| snapshot.subscribed_events = events)
            .await
    }

    async fn update<F>(&self, token: &str, f: F) -> bool
    where
        F: FnOnce(&mut IdentitySnapshot),
    {
        let result = self
            .entries
            .entry_by_ref(token)
            .and_compute_with(|maybe_entry| {
                let op = match maybe_entry {
                    Some(entry) => {
                        let mut snapshot = entry.into_value();
                        f(&mut snapshot);
                        Op::Put(snapshot)
                    }
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        matches!(result, CompResult::ReplacedWith(_) | CompResult::Inserted(_))
    }
}
