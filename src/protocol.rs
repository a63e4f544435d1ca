//! Contract for the messaging-protocol client each session drives.
//!
//! The gateway never speaks the wire protocol itself. It only sequences calls
//! on a [`ProtocolClient`] and interprets the [`ProtocolEvent`]s the client
//! hands to its registered [`EventHandler`].

use crate::types::events::ProtocolEvent;
use crate::types::jid::Jid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &ProtocolEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A fresh code to render for scanning.
    Code { code: String, timeout: Duration },
    Success { id: Jid },
    /// The codes ran out without a scan.
    Timeout,
    /// Any other terminal or informational pairing state, by name.
    Other(String),
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("client is already logged in (store contains a JID)")]
    AlreadyLoggedIn,
    #[error("failed to open pairing channel: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    pub fn mms_type(&self) -> &'static str {
        match self {
            MediaKind::Image | MediaKind::Sticker => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// Downloadable attachment carried by an inbound message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaAttachment {
    pub mimetype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub url: String,
    pub direct_path: String,
    #[serde(skip)]
    pub media_key: Vec<u8>,
    #[serde(skip)]
    pub file_sha256: Vec<u8>,
    #[serde(skip)]
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Message already composed by the (external) payload layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedMessage(pub serde_json::Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub jid: Jid,
    pub status: Option<String>,
    pub picture_id: Option<String>,
    pub is_business: bool,
    pub devices: Vec<Jid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePictureInfo {
    pub id: String,
    pub url: String,
    pub direct_path: Option<String>,
}

#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn is_logged_in(&self) -> bool;
    async fn logout(&self) -> anyhow::Result<()>;

    /// The device behind this client already holds pairing credentials.
    fn has_credentials(&self) -> bool;
    /// Display name of the paired account, empty if unknown.
    fn push_name(&self) -> String;

    /// Must be called before `connect` on an unpaired device.
    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, PairingError>;
    fn set_event_handler(&self, handler: Arc<dyn EventHandler>);

    async fn send_presence(&self, presence: Presence) -> anyhow::Result<()>;
    async fn download(&self, media: &MediaAttachment) -> anyhow::Result<Vec<u8>>;
    async fn upload_media(&self, data: Vec<u8>, kind: MediaKind) -> anyhow::Result<UploadResponse>;
    async fn send_message(&self, to: &Jid, message: ComposedMessage)
    -> anyhow::Result<SendResponse>;
    async fn get_user_info(&self, jids: &[Jid]) -> anyhow::Result<HashMap<Jid, UserInfo>>;
    async fn get_profile_picture(
        &self,
        jid: &Jid,
        preview: bool,
    ) -> anyhow::Result<Option<ProfilePictureInfo>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformType {
    Chrome,
    Firefox,
    Desktop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProps {
    pub os: String,
    pub platform: PlatformType,
}

/// Persisted device identity, as known to the device container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Set once the device has been paired.
    pub id: Option<Jid>,
    pub push_name: String,
}

/// Device identity persistence plus the factory for protocol clients.
#[async_trait]
pub trait DeviceContainer: Send + Sync {
    async fn get_device(&self, jid: &Jid) -> anyhow::Result<Option<Device>>;
    fn new_device(&self) -> Device;
    fn new_client(&self, device: Device, props: &DeviceProps) -> Arc<dyn ProtocolClient>;
}
