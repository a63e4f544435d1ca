//! Control-plane surface consumed by the HTTP layer.
//!
//! Every operation takes the caller's [`IdentitySnapshot`] (already resolved
//! from its bearer token) and acts on that account's session only.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::protocol::{
    ComposedMessage, DeviceContainer, MediaKind, ProfilePictureInfo, ProtocolClient, SendResponse,
    UploadResponse, UserInfo,
};
use crate::session::SessionManager;
use crate::store::AccountRepository;
use crate::types::account::{AccountId, ConnectionStatus, IdentitySnapshot};
use crate::types::jid::{Jid, parse_address};
use crate::types::subscription::Subscriptions;
use crate::webhook::WebhookClientFactory;
use anyhow::anyhow;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Event kinds to forward; unknown names are dropped, empty means all.
    pub subscribe: Vec<String>,
    /// Return right after spawning the session instead of confirming it.
    pub immediate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub webhook: String,
    pub subscribe: Vec<String>,
}

#[derive(Default)]
pub struct GatewayBuilder {
    repository: Option<Arc<dyn AccountRepository>>,
    devices: Option<Arc<dyn DeviceContainer>>,
    webhook_factory: Option<Arc<dyn WebhookClientFactory>>,
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub fn with_repository(mut self, repository: Arc<dyn AccountRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_device_container(mut self, devices: Arc<dyn DeviceContainer>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn with_webhook_factory(mut self, factory: Arc<dyn WebhookClientFactory>) -> Self {
        self.webhook_factory = Some(factory);
        self
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> anyhow::Result<Gateway> {
        let repository = self
            .repository
            .ok_or_else(|| anyhow!("An account repository is required"))?;
        let devices = self
            .devices
            .ok_or_else(|| anyhow!("A device container is required"))?;
        let webhook_factory = self
            .webhook_factory
            .ok_or_else(|| anyhow!("A webhook client factory is required"))?;

        info!(
            target: "Gateway/Startup",
            "Gateway ready (files under {})",
            self.config.files_dir.display()
        );
        Ok(Gateway {
            manager: Arc::new(SessionManager::new(
                repository,
                devices,
                webhook_factory,
                self.config,
            )),
        })
    }
}

#[derive(Clone)]
pub struct Gateway {
    manager: Arc<SessionManager>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub(crate) fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.manager.config
    }

    /// Starts the account's session with the requested subscriptions.
    ///
    /// Unless `immediate` is set, waits the configured confirmation delay and
    /// fails with `FailedToConnect` if the session is not connected by then.
    /// The background run is never cancelled by that failure.
    pub async fn connect(&self, identity: &IdentitySnapshot, options: ConnectOptions) -> Result<()> {
        let account_id = identity.account_id;
        let subscriptions = Subscriptions::normalize(&options.subscribe);
        let events = subscriptions.to_csv();

        self.manager.start_session(
            account_id,
            &identity.network_address,
            &identity.bearer_token,
            subscriptions.clone(),
        )?;

        if let Err(e) = self
            .manager
            .repository
            .set_subscribed_events(account_id, &events)
            .await
        {
            warn!(target: "Gateway/Session", "Could not store events for account {account_id}: {e:?}");
        }
        info!(target: "Gateway/Session", "Setting subscribed events for account {account_id}: {events}");

        let mut refreshed = identity.clone();
        refreshed.subscribed_events = subscriptions;
        self.manager
            .identities
            .set(&identity.bearer_token, refreshed)
            .await;

        if options.immediate {
            return Ok(());
        }

        let delay = self.manager.config.connect_confirm_delay;
        warn!(target: "Gateway/Session", "Waiting {delay:?} to confirm connection of account {account_id}");
        tokio::time::sleep(delay).await;

        let connected = self
            .manager
            .client(account_id)
            .is_ok_and(|client| client.is_connected());
        if !connected {
            return Err(GatewayError::FailedToConnect);
        }
        Ok(())
    }

    /// Ends a connected, logged-in session and clears its subscriptions.
    pub async fn disconnect(&self, identity: &IdentitySnapshot) -> Result<()> {
        let account_id = identity.account_id;
        let client = self.manager.client(account_id)?;

        if !client.is_connected() {
            warn!(target: "Gateway/Session", "Refusing disconnect of account {account_id}: not connected");
            return Err(GatewayError::NotConnected);
        }
        if !client.is_logged_in() {
            warn!(target: "Gateway/Session", "Refusing disconnect of account {account_id}: not logged in");
            return Err(GatewayError::NotLoggedIn);
        }

        self.manager.terminate(account_id);
        info!(target: "Gateway/Session", "Disconnection of account {account_id} requested");

        if let Err(e) = self
            .manager
            .repository
            .set_subscribed_events(account_id, "")
            .await
        {
            warn!(target: "Gateway/Session", "Could not clear events for account {account_id}: {e:?}");
        }
        let mut refreshed = identity.clone();
        refreshed.subscribed_events = Subscriptions::default();
        self.manager
            .identities
            .set(&identity.bearer_token, refreshed)
            .await;
        Ok(())
    }

    /// Unpairs the device, then ends the session.
    pub async fn logout(&self, identity: &IdentitySnapshot) -> Result<()> {
        let account_id = identity.account_id;
        let client = self.manager.client(account_id)?;

        match (client.is_connected(), client.is_logged_in()) {
            (true, true) => {
                client.logout().await.map_err(|e| {
                    error!(target: "Gateway/Session", "Could not log out account {account_id}: {e:?}");
                    GatewayError::Protocol(e)
                })?;
                info!(target: "Gateway/Session", "Account {account_id} logged out");
                self.manager.terminate(account_id);
                Ok(())
            }
            (true, false) => {
                warn!(target: "Gateway/Session", "Ignoring logout of account {account_id}: not logged in");
                Err(GatewayError::NotLoggedIn)
            }
            (false, _) => {
                warn!(target: "Gateway/Session", "Ignoring logout of account {account_id}: not connected");
                Err(GatewayError::NotConnected)
            }
        }
    }

    /// Reports the live flags and re-asserts the persisted connected flag
    /// when both hold.
    pub async fn get_status(&self, identity: &IdentitySnapshot) -> Result<ConnectionStatus> {
        let account_id = identity.account_id;
        let client = self.manager.client(account_id)?;
        let status = ConnectionStatus {
            connected: client.is_connected(),
            logged_in: client.is_logged_in(),
        };

        if status.connected
            && status.logged_in
            && let Err(e) = self.manager.repository.set_connected(account_id, true).await
        {
            warn!(target: "Gateway/Session", "Could not persist connected flag for account {account_id}: {e:?}");
        }
        Ok(status)
    }

    /// The pending pairing QR code as a PNG data URL.
    pub async fn get_qr(&self, identity: &IdentitySnapshot) -> Result<String> {
        let account_id = identity.account_id;
        let client = self.manager.client(account_id)?;
        if !client.is_connected() {
            return Err(GatewayError::NotConnected);
        }

        let account = self
            .manager
            .repository
            .get_by_id(account_id)
            .await
            .map_err(GatewayError::Repository)?
            .ok_or(GatewayError::Unauthorized)?;

        if client.is_logged_in() {
            return Err(GatewayError::AlreadyLoggedIn);
        }
        Ok(account.qr_payload)
    }

    pub async fn set_webhook(&self, identity: &IdentitySnapshot, url: &str) -> Result<()> {
        self.manager
            .repository
            .set_webhook(identity.account_id, url)
            .await
            .map_err(GatewayError::Repository)?;

        let mut refreshed = identity.clone();
        refreshed.webhook_url = url.to_string();
        self.manager
            .identities
            .set(&identity.bearer_token, refreshed)
            .await;
        Ok(())
    }

    /// Webhook URL and subscription list as persisted.
    pub async fn get_webhook(&self, identity: &IdentitySnapshot) -> Result<WebhookSettings> {
        let account = self
            .manager
            .repository
            .get_by_id(identity.account_id)
            .await
            .map_err(GatewayError::Repository)?
            .ok_or(GatewayError::Unauthorized)?;

        Ok(WebhookSettings {
            webhook: account.webhook_url,
            subscribe: account
                .subscribed_events
                .split(',')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// Resolves a bearer token, falling back to the repository on a cache
    /// miss and repopulating the cache.
    pub async fn get_or_refresh_identity(&self, token: &str) -> Result<IdentitySnapshot> {
        if let Some(identity) = self.manager.identities.get(token).await {
            return Ok(identity);
        }

        let account = match self.manager.repository.get_by_token(token).await {
            Ok(Some(account)) => account,
            Ok(None) => return Err(GatewayError::Unauthorized),
            Err(e) => {
                warn!(target: "Gateway/Session", "Identity lookup failed: {e:?}");
                return Err(GatewayError::Unauthorized);
            }
        };

        let identity = IdentitySnapshot::from(&account);
        self.manager.identities.set(token, identity.clone()).await;
        Ok(identity)
    }

    /// Signals the account's run-loop to stop. No-op without a session.
    pub fn terminate_session(&self, account_id: AccountId) -> bool {
        self.manager.terminate(account_id)
    }

    pub async fn user_info(
        &self,
        identity: &IdentitySnapshot,
        addresses: &[String],
    ) -> Result<HashMap<Jid, UserInfo>> {
        let jids = addresses
            .iter()
            .map(|raw| parse_recipient(raw))
            .collect::<Result<Vec<_>>>()?;
        self.connected_client(identity.account_id)?
            .get_user_info(&jids)
            .await
            .map_err(GatewayError::Protocol)
    }

    pub async fn profile_picture(
        &self,
        identity: &IdentitySnapshot,
        address: &str,
        preview: bool,
    ) -> Result<Option<ProfilePictureInfo>> {
        let jid = parse_recipient(address)?;
        self.connected_client(identity.account_id)?
            .get_profile_picture(&jid, preview)
            .await
            .map_err(GatewayError::Protocol)
    }

    pub async fn upload_media(
        &self,
        identity: &IdentitySnapshot,
        data: Vec<u8>,
        kind: MediaKind,
    ) -> Result<UploadResponse> {
        self.connected_client(identity.account_id)?
            .upload_media(data, kind)
            .await
            .map_err(GatewayError::Protocol)
    }

    pub async fn send_message(
        &self,
        identity: &IdentitySnapshot,
        recipient: &str,
        message: ComposedMessage,
    ) -> Result<SendResponse> {
        let to = parse_recipient(recipient)?;
        self.connected_client(identity.account_id)?
            .send_message(&to, message)
            .await
            .map_err(GatewayError::Protocol)
    }

    fn connected_client(&self, account_id: AccountId) -> Result<Arc<dyn ProtocolClient>> {
        let client = self.manager.client(account_id)?;
        if !client.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        Ok(client)
    }
}

fn parse_recipient(raw: &str) -> Result<Jid> {
    parse_address(raw).map_err(|e| GatewayError::InvalidAddress(format!("{raw}: {e}")))
}
