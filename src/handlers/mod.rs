//! Event dispatch for one session.
//!
//! The protocol client calls [`EventDispatcher::handle_event`] from its own
//! tasks; every event is processed on a freshly spawned task so the client is
//! never blocked by storage, downloads or webhook hand-off.

mod connection;
mod message;
mod receipt;

use crate::error::GatewayError;
use crate::protocol::{EventHandler, ProtocolClient};
use crate::session::SessionManager;
use crate::types::account::AccountId;
use crate::types::events::ProtocolEvent;
use crate::types::subscription::{EventKind, Subscriptions};
use crate::webhook::{JSON_DATA_FIELD, TOKEN_FIELD, WebhookClient, WebhookRequest};
use log::{debug, info, warn};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// Per-session values the dispatcher needs for every event.
#[derive(Clone)]
pub struct SessionContext {
    pub account_id: AccountId,
    /// Registry generation of the run that installed this dispatcher.
    pub generation: u64,
    pub token: String,
    pub subscriptions: Subscriptions,
    /// Weak so the client does not keep itself alive through its handler.
    pub client: Weak<dyn ProtocolClient>,
    pub webhook: Arc<dyn WebhookClient>,
}

/// Result of dispatching one event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Handled locally, never forwarded.
    Local,
    /// Dropped: unsupported sub-type or a failed side effect.
    Discarded,
    NotSubscribed(EventKind),
    /// Eligible, but no webhook URL is known for the account.
    NoWebhook,
    Queued(WebhookRequest),
}

/// Classification of a webhook-eligible event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Eligible {
    pub kind: EventKind,
    pub state: Option<&'static str>,
    pub file: Option<PathBuf>,
}

impl Eligible {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            state: None,
            file: None,
        }
    }

    fn with_state(mut self, state: &'static str) -> Self {
        self.state = Some(state);
        self
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    manager: Arc<SessionManager>,
    session: SessionContext,
}

impl EventDispatcher {
    pub fn new(manager: Arc<SessionManager>, session: SessionContext) -> Self {
        Self { manager, session }
    }

    pub fn account_id(&self) -> AccountId {
        self.session.account_id
    }

    fn client(&self) -> Option<Arc<dyn ProtocolClient>> {
        self.session.client.upgrade()
    }

    /// Runs the event's side effects and forwards it when eligible.
    pub async fn dispatch(&self, event: &ProtocolEvent) -> DispatchOutcome {
        let account_id = self.account_id();
        let eligible = match event {
            ProtocolEvent::PairSuccess(pair) => {
                self.on_pair_success(pair).await;
                return DispatchOutcome::Local;
            }
            ProtocolEvent::LoggedOut(logged_out) => {
                self.on_logged_out(logged_out).await;
                return DispatchOutcome::Local;
            }
            ProtocolEvent::Connected(_) | ProtocolEvent::PushNameSetting(_) => {
                self.on_connected().await;
                return DispatchOutcome::Local;
            }
            ProtocolEvent::AppStateSyncComplete(sync) => {
                self.on_app_state_sync_complete(sync).await;
                return DispatchOutcome::Local;
            }
            ProtocolEvent::StreamReplaced(_) => {
                info!(target: "Gateway/Events", "Received StreamReplaced event for account {account_id}");
                return DispatchOutcome::Local;
            }
            ProtocolEvent::Message(msg) => match self.on_message(msg).await {
                Ok(file) => Eligible {
                    file,
                    ..Eligible::new(EventKind::Message)
                },
                Err(e) => {
                    warn!(target: "Gateway/Events", "Dropping message {} for account {account_id}: {e:?}", msg.info.id);
                    return DispatchOutcome::Discarded;
                }
            },
            ProtocolEvent::Receipt(receipt) => match self.on_receipt(receipt) {
                Some(state) => Eligible::new(EventKind::ReadReceipt).with_state(state),
                None => return DispatchOutcome::Discarded,
            },
            ProtocolEvent::Presence(presence) => {
                let state = if presence.unavailable {
                    match presence.last_seen {
                        Some(last_seen) => info!(
                            target: "Gateway/Events",
                            "{} is now offline (last seen {last_seen})", presence.from
                        ),
                        None => info!(target: "Gateway/Events", "{} is now offline", presence.from),
                    }
                    "offline"
                } else {
                    info!(target: "Gateway/Events", "{} is now online", presence.from);
                    "online"
                };
                Eligible::new(EventKind::Presence).with_state(state)
            }
            ProtocolEvent::ChatPresence(update) => {
                info!(
                    target: "Gateway/Events",
                    "Chat presence {:?} ({:?}) from {} in {}",
                    update.state, update.media, update.sender, update.chat
                );
                Eligible::new(EventKind::ChatPresence)
            }
            ProtocolEvent::HistorySync(sync) => {
                match self.manager.media.save_history(account_id, &sync.data).await {
                    Ok(path) => {
                        info!(target: "Gateway/Events", "Wrote history sync to {}", path.display());
                    }
                    Err(e) => {
                        warn!(target: "Gateway/Events", "Failed to write history sync for account {account_id}: {e:?}");
                        return DispatchOutcome::Discarded;
                    }
                }
                Eligible::new(EventKind::HistorySync)
            }
            ProtocolEvent::Call(call) => {
                info!(
                    target: "Gateway/Events",
                    "Got call {:?} from {} (call id {})", call.kind, call.from, call.call_id
                );
                return DispatchOutcome::Local;
            }
            ProtocolEvent::AppState(state) => {
                info!(
                    target: "Gateway/Events",
                    "App state event received: index {:?}, action {}", state.index, state.action
                );
                return DispatchOutcome::Local;
            }
            ProtocolEvent::Unknown(unknown) => {
                warn!(
                    target: "Gateway/Events",
                    "Unhandled event {} for account {account_id}: {}", unknown.name, unknown.detail
                );
                return DispatchOutcome::Local;
            }
        };

        self.forward(event, eligible).await
    }

    async fn forward(&self, event: &ProtocolEvent, eligible: Eligible) -> DispatchOutcome {
        let account_id = self.account_id();

        let Some(identity) = self.manager.identities.get(&self.session.token).await else {
            warn!(
                target: "Gateway/Events",
                "Could not call webhook as there is no identity cached for account {account_id}"
            );
            return DispatchOutcome::NoWebhook;
        };

        if !self.session.subscriptions.accepts(eligible.kind) {
            debug!(
                target: "Gateway/Events",
                "Skipping webhook for account {account_id}: not subscribed to {}", eligible.kind
            );
            return DispatchOutcome::NotSubscribed(eligible.kind);
        }

        if identity.webhook_url.is_empty() {
            warn!(
                target: "Gateway/Events",
                "{} (account {account_id})", GatewayError::MissingWebhookContext
            );
            return DispatchOutcome::NoWebhook;
        }

        let event = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!(target: "Gateway/Events", "Could not serialize {} for account {account_id}: {e}", event.name());
                return DispatchOutcome::Discarded;
            }
        };
        let mut body = serde_json::Map::new();
        body.insert("event".to_string(), event);
        body.insert("type".to_string(), json!(eligible.kind.as_str()));
        if let Some(state) = eligible.state {
            body.insert("state".to_string(), json!(state));
        }

        let request = WebhookRequest {
            account_id,
            url: identity.webhook_url,
            fields: vec![
                (JSON_DATA_FIELD.to_string(), serde_json::Value::Object(body).to_string()),
                (TOKEN_FIELD.to_string(), self.session.token.clone()),
            ],
            file: eligible.file,
        };

        self.manager
            .notifier
            .notify(Arc::clone(&self.session.webhook), request.clone());
        DispatchOutcome::Queued(request)
    }
}

impl EventHandler for EventDispatcher {
    fn handle_event(&self, event: &ProtocolEvent) {
        let dispatcher = self.clone();
        let event = event.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&event).await;
        });
    }
}
