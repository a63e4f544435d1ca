//! Events produced by the protocol client for one account.
//!
//! Every payload derives `Serialize`; the serialized form is what the
//! webhook receives under the `event` key of `jsonData`.

use crate::protocol::MediaAttachment;
use crate::types::jid::Jid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the app-state patch whose completion marks the initial sync.
pub const CRITICAL_BLOCK_PATCH: &str = "critical_block";

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProtocolEvent {
    PairSuccess(PairSuccess),
    LoggedOut(LoggedOut),
    Connected(Connected),
    PushNameSetting(PushNameSetting),
    AppStateSyncComplete(AppStateSyncComplete),
    Message(Box<MessageEvent>),
    Receipt(Receipt),
    Presence(PresenceUpdate),
    ChatPresence(ChatPresenceUpdate),
    HistorySync(HistorySync),
    Call(CallEvent),
    AppState(AppStateEvent),
    StreamReplaced(StreamReplaced),
    /// Anything the protocol client emits that the gateway has no use for.
    Unknown(UnknownEvent),
}

impl ProtocolEvent {
    /// Short tag used in log lines.
    pub fn name(&self) -> &str {
        match self {
            ProtocolEvent::PairSuccess(_) => "PairSuccess",
            ProtocolEvent::LoggedOut(_) => "LoggedOut",
            ProtocolEvent::Connected(_) => "Connected",
            ProtocolEvent::PushNameSetting(_) => "PushNameSetting",
            ProtocolEvent::AppStateSyncComplete(_) => "AppStateSyncComplete",
            ProtocolEvent::Message(_) => "Message",
            ProtocolEvent::Receipt(_) => "Receipt",
            ProtocolEvent::Presence(_) => "Presence",
            ProtocolEvent::ChatPresence(_) => "ChatPresence",
            ProtocolEvent::HistorySync(_) => "HistorySync",
            ProtocolEvent::Call(_) => "Call",
            ProtocolEvent::AppState(_) => "AppState",
            ProtocolEvent::StreamReplaced(_) => "StreamReplaced",
            ProtocolEvent::Unknown(e) => &e.name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairSuccess {
    pub id: Jid,
    pub business_name: String,
    pub platform: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {
    pub on_connect: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Connected;

#[derive(Debug, Clone, Serialize)]
pub struct PushNameSetting {
    pub timestamp: DateTime<Utc>,
    pub push_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppStateSyncComplete {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageInfo {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    pub is_from_me: bool,
    pub is_group: bool,
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub category: String,
}

impl MessageInfo {
    pub fn source_string(&self) -> String {
        if self.sender != self.chat {
            format!("{} in {}", self.sender, self.chat)
        } else {
            self.chat.to_string()
        }
    }
}

/// Decoded message body. Only the parts the gateway inspects are typed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<MediaAttachment>,
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageEvent {
    pub info: MessageInfo,
    pub message: MessageContent,
    pub is_view_once: bool,
    pub is_ephemeral: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ReceiptType {
    Delivered,
    Sender,
    Retry,
    Read,
    ReadSelf,
    Played,
    PlayedSelf,
    ServerError,
    Inactive,
    PeerMsg,
    HistorySync,
    Other(String),
}

impl From<String> for ReceiptType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "delivered" => Self::Delivered,
            "sender" => Self::Sender,
            "retry" => Self::Retry,
            "read" => Self::Read,
            "read-self" => Self::ReadSelf,
            "played" => Self::Played,
            "played-self" => Self::PlayedSelf,
            "server-error" => Self::ServerError,
            "inactive" => Self::Inactive,
            "peer_msg" => Self::PeerMsg,
            "hist_sync" => Self::HistorySync,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ReceiptType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub message_ids: Vec<String>,
    pub chat: Jid,
    pub sender: Jid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub receipt_type: ReceiptType,
}

impl Receipt {
    pub fn source_string(&self) -> String {
        if self.sender != self.chat {
            format!("{} in {}", self.sender, self.chat)
        } else {
            self.chat.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceUpdate {
    pub from: Jid,
    pub unavailable: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatPresence {
    Composing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChatPresenceMedia {
    #[serde(rename = "")]
    #[default]
    Text,
    #[serde(rename = "audio")]
    Audio,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatPresenceUpdate {
    pub chat: Jid,
    pub sender: Jid,
    pub state: ChatPresence,
    pub media: ChatPresenceMedia,
}

/// Raw history-sync blob, already decoded by the protocol client.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySync {
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallEventKind {
    Offer,
    Accept,
    Terminate,
    OfferNotice,
    RelayLatency,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallEvent {
    pub kind: CallEventKind,
    pub from: Jid,
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppStateEvent {
    pub index: Vec<String>,
    pub action: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamReplaced;

#[derive(Debug, Clone, Serialize)]
pub struct UnknownEvent {
    pub name: String,
    pub detail: serde_json::Value,
}
