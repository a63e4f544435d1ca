//! Per-account run-loop: acquire a device, connect (pairing first when the
//! device is fresh), then park until the termination signal and tear down.

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::handlers::{EventDispatcher, SessionContext};
use crate::identity_cache::IdentityCache;
use crate::media::MediaStore;
use crate::protocol::{
    Device, DeviceContainer, DeviceProps, PairingError, PairingEvent, PlatformType, ProtocolClient,
};
use crate::qrcode::render_data_url;
use crate::registry::{SessionRegistry, SessionTicket};
use crate::store::AccountRepository;
use crate::types::account::AccountId;
use crate::types::jid::{Jid, parse_address};
use crate::types::subscription::Subscriptions;
use crate::webhook::{WebhookClientFactory, WebhookNotifier};
use anyhow::Context;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How a pairing attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairingOutcome {
    /// The pairing channel closed; the session stays up.
    Finished,
    TimedOut,
    Terminated,
}

/// Owns every collaborator a session needs and drives the run-loops.
pub struct SessionManager {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) repository: Arc<dyn AccountRepository>,
    pub(crate) devices: Arc<dyn DeviceContainer>,
    pub(crate) identities: IdentityCache,
    pub(crate) webhook_factory: Arc<dyn WebhookClientFactory>,
    pub(crate) notifier: WebhookNotifier,
    pub(crate) media: MediaStore,
    pub(crate) config: GatewayConfig,
}

impl SessionManager {
    pub fn new(
        repository: Arc<dyn AccountRepository>,
        devices: Arc<dyn DeviceContainer>,
        webhook_factory: Arc<dyn WebhookClientFactory>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            repository,
            devices,
            identities: IdentityCache::new(config.identity_ttl),
            webhook_factory,
            notifier: WebhookNotifier::new(),
            media: MediaStore::new(config.files_dir.clone()),
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn identities(&self) -> &IdentityCache {
        &self.identities
    }

    /// Reserves the registry slot and spawns the run-loop.
    ///
    /// Returns as soon as the loop is spawned. Fails with `AlreadyConnected`
    /// when the account already has a connected handle.
    pub fn start_session(
        self: &Arc<Self>,
        account_id: AccountId,
        network_address: &str,
        token: &str,
        subscriptions: Subscriptions,
    ) -> Result<JoinHandle<()>> {
        let ticket = self
            .registry
            .reserve(account_id, token, subscriptions.clone())?;
        info!(
            target: "Gateway/Session",
            "Starting connection for account {account_id} (address: '{network_address}', events: {})",
            subscriptions.to_csv()
        );

        let manager = Arc::clone(self);
        let address = network_address.to_string();
        let token = token.to_string();
        Ok(tokio::spawn(async move {
            manager.run(ticket, address, token, subscriptions).await;
        }))
    }

    /// Signals the account's run-loop to tear down. No-op without a session.
    pub fn terminate(&self, account_id: AccountId) -> bool {
        let signalled = self.registry.terminate(account_id);
        if signalled {
            debug!(target: "Gateway/Session", "Termination signalled for account {account_id}");
        }
        signalled
    }

    async fn run(
        self: Arc<Self>,
        mut ticket: SessionTicket,
        address: String,
        token: String,
        subscriptions: Subscriptions,
    ) {
        let account_id = ticket.account_id;

        let device = match self.acquire_device(&address).await {
            Ok(device) => device,
            Err(e) => {
                error!(target: "Gateway/Session", "Device store failure for account {account_id}: {e}");
                self.registry.remove(account_id, ticket.generation);
                return;
            }
        };

        let props = DeviceProps {
            os: self.config.device_os.clone(),
            platform: PlatformType::Chrome,
        };
        let client = self.devices.new_client(device, &props);
        let webhook = self
            .webhook_factory
            .create_client(account_id, &self.config.webhook);

        if !self
            .registry
            .attach(&ticket, Arc::clone(&client), Arc::clone(&webhook))
        {
            debug!(target: "Gateway/Session", "Account {account_id} superseded before connecting");
            return;
        }

        let context = SessionContext {
            account_id,
            generation: ticket.generation,
            token: token.clone(),
            subscriptions,
            client: Arc::downgrade(&client),
            webhook,
        };
        client.set_event_handler(Arc::new(EventDispatcher::new(
            Arc::clone(&self),
            context,
        )));

        match self.establish(&mut ticket, &client, &token).await {
            Ok(PairingOutcome::Finished) => {
                wait_for_termination(&mut ticket.shutdown).await;
                info!(target: "Gateway/Session", "Received kill signal for account {account_id}");
            }
            Ok(PairingOutcome::Terminated) => {
                info!(target: "Gateway/Session", "Pairing for account {account_id} interrupted");
            }
            Ok(PairingOutcome::TimedOut) => {
                warn!(target: "Gateway/Session", "QR timeout, closing session for account {account_id}");
            }
            Err(e) => {
                error!(target: "Gateway/Session", "Failed to connect account {account_id}: {e:?}");
                client.disconnect().await;
                self.registry.remove(account_id, ticket.generation);
                return;
            }
        }

        self.teardown(&ticket, client.as_ref()).await;
    }

    async fn acquire_device(&self, address: &str) -> anyhow::Result<Device> {
        if address.is_empty() {
            warn!(target: "Gateway/Session", "No address found, creating new device");
            return Ok(self.devices.new_device());
        }

        let jid = parse_address(address).with_context(|| format!("bad stored address {address}"))?;
        match self.devices.get_device(&jid).await? {
            Some(device) => Ok(device),
            None => {
                warn!(target: "Gateway/Session", "No device stored for {jid}, creating new device");
                Ok(self.devices.new_device())
            }
        }
    }

    async fn establish(
        &self,
        ticket: &mut SessionTicket,
        client: &Arc<dyn ProtocolClient>,
        token: &str,
    ) -> anyhow::Result<PairingOutcome> {
        if client.has_credentials() {
            info!(target: "Gateway/Session", "Already logged in, just connecting account {}", ticket.account_id);
            client.connect().await?;
            return Ok(PairingOutcome::Finished);
        }

        let pairing = match client.pairing_channel().await {
            Ok(rx) => rx,
            Err(PairingError::AlreadyLoggedIn) => {
                client.connect().await?;
                return Ok(PairingOutcome::Finished);
            }
            Err(PairingError::Other(e)) => return Err(e.context("failed to open pairing channel")),
        };

        client.connect().await?;
        Ok(self.await_pairing(ticket, token, pairing).await)
    }

    async fn await_pairing(
        &self,
        ticket: &mut SessionTicket,
        token: &str,
        mut pairing: mpsc::Receiver<PairingEvent>,
    ) -> PairingOutcome {
        let account_id = ticket.account_id;
        loop {
            tokio::select! {
                event = pairing.recv() => match event {
                    Some(PairingEvent::Code { code, timeout }) => {
                        debug!(target: "Gateway/Session", "New QR code for account {account_id}, valid for {timeout:?}");
                        self.store_qr(account_id, &code).await;
                    }
                    Some(PairingEvent::Timeout) => {
                        self.clear_qr(account_id).await;
                        return PairingOutcome::TimedOut;
                    }
                    Some(PairingEvent::Success { id }) => {
                        info!(target: "Gateway/Session", "QR pairing ok for account {account_id}");
                        self.clear_qr(account_id).await;
                        self.record_pairing(account_id, token, &id).await;
                    }
                    Some(PairingEvent::Other(name)) => {
                        info!(target: "Gateway/Session", "Login event {name} for account {account_id}");
                    }
                    None => return PairingOutcome::Finished,
                },
                _ = wait_for_termination(&mut ticket.shutdown) => {
                    self.clear_qr(account_id).await;
                    return PairingOutcome::Terminated;
                }
            }
        }
    }

    async fn store_qr(&self, account_id: AccountId, code: &str) {
        let payload = match render_data_url(code, self.config.qr_image_size) {
            Ok(payload) => payload,
            Err(e) => {
                error!(target: "Gateway/Session", "Failed to render QR code for account {account_id}: {e}");
                return;
            }
        };
        if let Err(e) = self.repository.set_qr_payload(account_id, &payload).await {
            error!(target: "Gateway/Session", "Failed to set QR code for account {account_id}: {e:?}");
        }
    }

    async fn clear_qr(&self, account_id: AccountId) {
        if let Err(e) = self.repository.set_qr_payload(account_id, "").await {
            error!(target: "Gateway/Session", "Failed to clear QR code for account {account_id}: {e:?}");
        }
    }

    /// Persists a freshly paired address and refreshes the cached identity,
    /// leaving its webhook and subscriptions untouched.
    pub(crate) async fn record_pairing(&self, account_id: AccountId, token: &str, address: &Jid) {
        if let Err(e) = self
            .repository
            .set_network_address(account_id, address)
            .await
        {
            error!(target: "Gateway/Session", "Failed to store address for account {account_id}: {e:?}");
        }
        if !self.identities.refresh_address(token, address).await {
            warn!(
                target: "Gateway/Session",
                "No cached identity for account {account_id}; address refresh skipped"
            );
        }
    }

    async fn teardown(&self, ticket: &SessionTicket, client: &dyn ProtocolClient) {
        let account_id = ticket.account_id;
        client.disconnect().await;

        if !self.registry.remove(account_id, ticket.generation) {
            debug!(target: "Gateway/Session", "Account {account_id} was superseded; leaving its entry alone");
            return;
        }
        if let Err(e) = self.repository.set_connected(account_id, false).await {
            error!(target: "Gateway/Session", "Failed to set account {account_id} disconnected: {e:?}");
        }
    }

    /// Resolves the registered protocol client for a control call.
    pub(crate) fn client(&self, account_id: AccountId) -> Result<Arc<dyn ProtocolClient>> {
        self.registry.client(account_id)
    }
}

/// Resolves once the termination flag is raised or its sender is gone.
async fn wait_for_termination(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|terminated| *terminated).await.is_err() {
        debug!(target: "Gateway/Session", "Termination channel dropped");
    }
}
