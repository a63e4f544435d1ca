use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::protocol::{
    ComposedMessage, Device, DeviceContainer, DeviceProps, EventHandler, MediaAttachment,
    MediaKind, PairingError, PairingEvent, Presence, ProfilePictureInfo, ProtocolClient,
    SendResponse, UploadResponse, UserInfo,
};
use crate::store::{AccountRepository, MemoryAccountStore};
use crate::types::account::{Account, AccountId, IdentitySnapshot};
use crate::types::events::ProtocolEvent;
use crate::types::jid::Jid;
use crate::webhook::{WebhookClient, WebhookClientFactory, WebhookConfig, WebhookRequest};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `condition` every 10ms for up to two seconds.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// In-process stand-in for a protocol client.
#[derive(Default)]
pub struct FakeProtocolClient {
    device: Device,
    connected: AtomicBool,
    logged_in: AtomicBool,
    credentials: AtomicBool,
    fail_connect: AtomicBool,
    push_name: Mutex<String>,
    pairing: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    presences: Mutex<Vec<Presence>>,
    sent: Mutex<Vec<(Jid, ComposedMessage)>>,
    download_data: Mutex<Vec<u8>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    logouts: AtomicUsize,
}

impl FakeProtocolClient {
    pub fn unpaired() -> Self {
        Self::default()
    }

    pub fn paired(address: &str) -> Self {
        Self::for_device(Device {
            id: address.parse().ok(),
            push_name: String::new(),
        })
    }

    pub fn for_device(device: Device) -> Self {
        let client = Self {
            credentials: AtomicBool::new(device.id.is_some()),
            push_name: Mutex::new(device.push_name.clone()),
            ..Default::default()
        };
        Self { device, ..client }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }

    pub fn set_push_name(&self, name: &str) {
        *self.push_name.lock().unwrap() = name.to_string();
    }

    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn set_download_data(&self, data: &[u8]) {
        *self.download_data.lock().unwrap() = data.to_vec();
    }

    /// Sender half of the pairing channel, once the session opened it.
    pub fn pairing_sender(&self) -> Option<mpsc::Sender<PairingEvent>> {
        self.pairing.lock().unwrap().clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    /// Delivers an event to the registered handler, as the network would.
    pub fn emit(&self, event: ProtocolEvent) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler.handle_event(&event);
        }
    }

    pub fn presences(&self) -> Vec<Presence> {
        self.presences.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(Jid, ComposedMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolClient for FakeProtocolClient {
    async fn connect(&self) -> anyhow::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("websocket handshake failed"));
        }
        self.connected.store(true, Ordering::SeqCst);
        if self.credentials.load(Ordering::SeqCst) {
            self.logged_in.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
        self.credentials.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn has_credentials(&self) -> bool {
        self.credentials.load(Ordering::SeqCst)
    }

    fn push_name(&self) -> String {
        self.push_name.lock().unwrap().clone()
    }

    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, PairingError> {
        if self.credentials.load(Ordering::SeqCst) {
            return Err(PairingError::AlreadyLoggedIn);
        }
        let (tx, rx) = mpsc::channel(8);
        *self.pairing.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn set_event_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn send_presence(&self, presence: Presence) -> anyhow::Result<()> {
        self.presences.lock().unwrap().push(presence);
        Ok(())
    }

    async fn download(&self, _media: &MediaAttachment) -> anyhow::Result<Vec<u8>> {
        Ok(self.download_data.lock().unwrap().clone())
    }

    async fn upload_media(&self, data: Vec<u8>, kind: MediaKind) -> anyhow::Result<UploadResponse> {
        Ok(UploadResponse {
            url: format!("https://mmg.example/{}", kind.mms_type()),
            direct_path: format!("/v/{}", kind.mms_type()),
            media_key: vec![1; 32],
            file_enc_sha256: vec![2; 32],
            file_sha256: vec![3; 32],
            file_length: data.len() as u64,
        })
    }

    async fn send_message(
        &self,
        to: &Jid,
        message: ComposedMessage,
    ) -> anyhow::Result<SendResponse> {
        self.sent.lock().unwrap().push((to.clone(), message));
        Ok(SendResponse {
            id: "3EB0FAKE".to_string(),
            timestamp: chrono::Utc::now(),
        })
    }

    async fn get_user_info(&self, jids: &[Jid]) -> anyhow::Result<HashMap<Jid, UserInfo>> {
        Ok(jids
            .iter()
            .map(|jid| {
                (
                    jid.clone(),
                    UserInfo {
                        jid: jid.clone(),
                        status: Some("Hey there!".to_string()),
                        picture_id: None,
                        is_business: false,
                        devices: vec![jid.clone()],
                    },
                )
            })
            .collect())
    }

    async fn get_profile_picture(
        &self,
        jid: &Jid,
        _preview: bool,
    ) -> anyhow::Result<Option<ProfilePictureInfo>> {
        Ok(Some(ProfilePictureInfo {
            id: "1".to_string(),
            url: format!("https://pps.example/{}", jid.user),
            direct_path: None,
        }))
    }
}

/// Device container that hands out [`FakeProtocolClient`]s and remembers them.
#[derive(Default)]
pub struct FakeDevices {
    stored: Mutex<HashMap<Jid, Device>>,
    clients: Mutex<Vec<Arc<FakeProtocolClient>>>,
    props: Mutex<Vec<DeviceProps>>,
    fail_lookup: AtomicBool,
    fail_connect: AtomicBool,
}

impl FakeDevices {
    pub fn store_paired(&self, address: &str, push_name: &str) {
        let jid: Jid = address.parse().unwrap();
        self.stored.lock().unwrap().insert(
            jid.clone(),
            Device {
                id: Some(jid),
                push_name: push_name.to_string(),
            },
        );
    }

    pub fn fail_lookups(&self) {
        self.fail_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_connects(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn clients(&self) -> Vec<Arc<FakeProtocolClient>> {
        self.clients.lock().unwrap().clone()
    }

    pub fn last_client(&self) -> Option<Arc<FakeProtocolClient>> {
        self.clients.lock().unwrap().last().cloned()
    }

    pub fn props(&self) -> Vec<DeviceProps> {
        self.props.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceContainer for FakeDevices {
    async fn get_device(&self, jid: &Jid) -> anyhow::Result<Option<Device>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(anyhow!("corrupt credential for {jid}"));
        }
        Ok(self.stored.lock().unwrap().get(jid).cloned())
    }

    fn new_device(&self) -> Device {
        Device::default()
    }

    fn new_client(&self, device: Device, props: &DeviceProps) -> Arc<dyn ProtocolClient> {
        let client = Arc::new(FakeProtocolClient::for_device(device));
        if self.fail_connect.load(Ordering::SeqCst) {
            client.fail_connect();
        }
        self.props.lock().unwrap().push(props.clone());
        self.clients.lock().unwrap().push(Arc::clone(&client));
        client
    }
}

/// Webhook client that records requests instead of sending them.
#[derive(Default)]
pub struct SpyWebhookClient {
    calls: Mutex<Vec<WebhookRequest>>,
}

impl SpyWebhookClient {
    pub fn calls(&self) -> Vec<WebhookRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookClient for SpyWebhookClient {
    async fn deliver(&self, request: &WebhookRequest) -> anyhow::Result<u16> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(200)
    }
}

#[derive(Default)]
pub struct SpyWebhookFactory {
    clients: Mutex<HashMap<AccountId, Arc<SpyWebhookClient>>>,
}

impl SpyWebhookFactory {
    pub fn spy(&self, account_id: AccountId) -> Arc<SpyWebhookClient> {
        Arc::clone(
            self.clients
                .lock()
                .unwrap()
                .entry(account_id)
                .or_default(),
        )
    }
}

impl WebhookClientFactory for SpyWebhookFactory {
    fn create_client(&self, account_id: AccountId, _config: &WebhookConfig) -> Arc<dyn WebhookClient> {
        self.spy(account_id)
    }
}

/// Memory store that also records connection-flag and QR writes.
#[derive(Default)]
pub struct RecordingRepository {
    inner: MemoryAccountStore,
    connected_writes: Mutex<Vec<(AccountId, bool)>>,
    qr_writes: Mutex<Vec<(AccountId, String)>>,
    fail_connected_query: AtomicBool,
}

impl RecordingRepository {
    pub async fn insert(&self, account: Account) {
        self.inner.insert(account).await;
    }

    pub fn connected_writes(&self, account_id: AccountId) -> Vec<bool> {
        self.connected_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == account_id)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn qr_writes(&self, account_id: AccountId) -> Vec<String> {
        self.qr_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == account_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn fail_connected_query(&self) {
        self.fail_connected_query.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountRepository for RecordingRepository {
    async fn get_connected_accounts(&self) -> anyhow::Result<Vec<Account>> {
        if self.fail_connected_query.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        self.inner.get_connected_accounts().await
    }

    async fn get_by_id(&self, id: AccountId) -> anyhow::Result<Option<Account>> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<Account>> {
        self.inner.get_by_token(token).await
    }

    async fn set_connected(&self, id: AccountId, connected: bool) -> anyhow::Result<()> {
        self.connected_writes.lock().unwrap().push((id, connected));
        self.inner.set_connected(id, connected).await
    }

    async fn set_network_address(&self, id: AccountId, address: &Jid) -> anyhow::Result<()> {
        self.inner.set_network_address(id, address).await
    }

    async fn set_qr_payload(&self, id: AccountId, payload: &str) -> anyhow::Result<()> {
        self.qr_writes
            .lock()
            .unwrap()
            .push((id, payload.to_string()));
        self.inner.set_qr_payload(id, payload).await
    }

    async fn set_subscribed_events(&self, id: AccountId, csv: &str) -> anyhow::Result<()> {
        self.inner.set_subscribed_events(id, csv).await
    }

    async fn set_webhook(&self, id: AccountId, url: &str) -> anyhow::Result<()> {
        self.inner.set_webhook(id, url).await
    }
}

/// A gateway wired to fakes, with media written under a temporary directory.
pub struct Harness {
    pub gateway: Gateway,
    pub repository: Arc<RecordingRepository>,
    pub devices: Arc<FakeDevices>,
    pub webhooks: Arc<SpyWebhookFactory>,
    pub files: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();
        let files = TempDir::new().unwrap();
        let repository = Arc::new(RecordingRepository::default());
        let devices = Arc::new(FakeDevices::default());
        let webhooks = Arc::new(SpyWebhookFactory::default());

        let config = GatewayConfig {
            files_dir: files.path().to_path_buf(),
            connect_confirm_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let gateway = Gateway::builder()
            .with_repository(repository.clone())
            .with_device_container(devices.clone())
            .with_webhook_factory(webhooks.clone())
            .with_config(config)
            .build()
            .unwrap();

        Self {
            gateway,
            repository,
            devices,
            webhooks,
            files,
        }
    }

    /// Stores an account and caches its identity, as the HTTP layer would
    /// after authenticating its token.
    pub async fn seed_account(
        &self,
        id: AccountId,
        token: &str,
        webhook_url: &str,
        events: &str,
    ) -> IdentitySnapshot {
        let account = Account {
            id,
            display_name: format!("account {id}"),
            bearer_token: token.to_string(),
            webhook_url: webhook_url.to_string(),
            subscribed_events: events.to_string(),
            ..Default::default()
        };
        self.repository.insert(account.clone()).await;
        let identity = IdentitySnapshot::from(&account);
        self.gateway
            .manager()
            .identities
            .set(token, identity.clone())
            .await;
        identity
    }

    pub async fn account(&self, id: AccountId) -> Account {
        self.repository.get_by_id(id).await.unwrap().unwrap()
    }

    /// Polls the stored account until `predicate` holds.
    pub async fn wait_for_account<F>(&self, id: AccountId, predicate: F) -> Account
    where
        F: Fn(&Account) -> bool,
    {
        for _ in 0..200 {
            let account = self.account(id).await;
            if predicate(&account) {
                return account;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("account {id} never reached the expected state");
    }

    /// Waits until the session has a client attached and returns it.
    pub async fn wait_for_client(&self, count: usize) -> Arc<FakeProtocolClient> {
        let devices = &self.devices;
        assert!(
            eventually(|| devices.clients().len() >= count).await,
            "no protocol client was created"
        );
        devices.clients()[count - 1].clone()
    }
}
