//! Process-wide table of live sessions, keyed by account id.
//!
//! Backed by a sharded [`DashMap`]: operations on one account never serialize
//! unrelated accounts, and no shard lock is held across an `.await`.
//!
//! Each reservation gets a fresh generation number. Only the run-loop that
//! owns the current generation may remove the entry, so a superseded run can
//! never delete the entry of the run that replaced it.

use crate::error::{GatewayError, Result};
use crate::protocol::ProtocolClient;
use crate::types::account::AccountId;
use crate::types::subscription::Subscriptions;
use crate::webhook::WebhookClient;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

pub struct Session {
    generation: u64,
    client: Option<Arc<dyn ProtocolClient>>,
    webhook: Option<Arc<dyn WebhookClient>>,
    shutdown: watch::Sender<bool>,
    pub token: String,
    pub subscriptions: Subscriptions,
}

impl Session {
    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }
}

/// Handed to the run-loop that owns a fresh reservation.
pub struct SessionTicket {
    pub account_id: AccountId,
    pub generation: u64,
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<AccountId, Session>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `account_id` with a new termination channel.
    ///
    /// Fails with `AlreadyConnected` when the current handle reports
    /// connected; otherwise any previous entry is superseded.
    pub fn reserve(
        &self,
        account_id: AccountId,
        token: &str,
        subscriptions: Subscriptions,
    ) -> Result<SessionTicket> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let session = Session {
            generation,
            client: None,
            webhook: None,
            shutdown,
            token: token.to_string(),
            subscriptions,
        };

        match self.sessions.entry(account_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_connected() {
                    return Err(GatewayError::AlreadyConnected);
                }
                debug!(
                    "Superseding session generation {} for account {account_id}",
                    occupied.get().generation
                );
                occupied.insert(session);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session);
            }
        }

        Ok(SessionTicket {
            account_id,
            generation,
            shutdown: shutdown_rx,
        })
    }

    /// Publishes the protocol and webhook clients of a running session.
    /// Returns `false` if the reservation was superseded meanwhile.
    pub fn attach(
        &self,
        ticket: &SessionTicket,
        client: Arc<dyn ProtocolClient>,
        webhook: Arc<dyn WebhookClient>,
    ) -> bool {
        match self.sessions.get_mut(&ticket.account_id) {
            Some(mut session) if session.generation == ticket.generation => {
                session.client = Some(client);
                session.webhook = Some(webhook);
                true
            }
            _ => false,
        }
    }

    pub fn client(&self, account_id: AccountId) -> Result<Arc<dyn ProtocolClient>> {
        let session = self
            .sessions
            .get(&account_id)
            .ok_or(GatewayError::NoSession)?;
        session.client.clone().ok_or(GatewayError::NotConnected)
    }

    pub fn webhook_client(&self, account_id: AccountId) -> Option<Arc<dyn WebhookClient>> {
        self.sessions
            .get(&account_id)
            .and_then(|session| session.webhook.clone())
    }

    /// Signals the run-loop to tear down. Returns `true` only for the call
    /// that actually delivered the signal; repeated calls and calls for
    /// unknown accounts are no-ops.
    pub fn terminate(&self, account_id: AccountId) -> bool {
        match self.sessions.get(&account_id) {
            Some(session) => !session.shutdown.send_replace(true),
            None => false,
        }
    }

    /// Like [`terminate`](Self::terminate), but only while the entry still
    /// belongs to `generation`.
    pub fn terminate_generation(&self, account_id: AccountId, generation: u64) -> bool {
        match self.sessions.get(&account_id) {
            Some(session) if session.generation == generation => {
                !session.shutdown.send_replace(true)
            }
            _ => false,
        }
    }

    pub fn is_current(&self, account_id: AccountId, generation: u64) -> bool {
        self.generation(account_id) == Some(generation)
    }

    /// Drops the entry if it still belongs to `generation`.
    pub fn remove(&self, account_id: AccountId, generation: u64) -> bool {
        self.sessions
            .remove_if(&account_id, |_, session| session.generation == generation)
            .is_some()
    }

    pub fn contains(&self, account_id: AccountId) -> bool {
        self.sessions.contains_key(&account_id)
    }

    pub fn generation(&self, account_id: AccountId) -> Option<u64> {
        self.sessions.get(&account_id).map(|s| s.generation)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
