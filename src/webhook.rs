//! Fire-and-forget webhook delivery.
//!
//! Each account owns one [`WebhookClient`], created by the gateway's
//! [`WebhookClientFactory`] when its session starts. Deliveries are spawned
//! and never awaited by the dispatcher; failures only reach the log.

use crate::types::account::AccountId;
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const JSON_DATA_FIELD: &str = "jsonData";
pub const TOKEN_FIELD: &str = "token";
pub const FILE_FIELD: &str = "file";

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub timeout: Duration,
    pub max_redirects: u32,
    /// Skip TLS certificate verification for webhook endpoints.
    pub accept_invalid_certs: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_redirects: 15,
            accept_invalid_certs: true,
        }
    }
}

/// One webhook POST: form fields, plus a file part when `file` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub account_id: AccountId,
    pub url: String,
    pub fields: Vec<(String, String)>,
    pub file: Option<PathBuf>,
}

impl WebhookRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        self.file.is_some()
    }
}

#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// Sends the request once and returns the HTTP status code.
    async fn deliver(&self, request: &WebhookRequest) -> Result<u16>;
}

pub trait WebhookClientFactory: Send + Sync {
    fn create_client(&self, account_id: AccountId, config: &WebhookConfig)
    -> Arc<dyn WebhookClient>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WebhookNotifier;

impl WebhookNotifier {
    pub fn new() -> Self {
        Self
    }

    /// Spawns the delivery and returns immediately. The handle is only
    /// useful to tests; production callers drop it.
    pub fn notify(&self, client: Arc<dyn WebhookClient>, request: WebhookRequest) -> JoinHandle<()> {
        tokio::spawn(async move {
            match &request.file {
                Some(file) => info!(
                    target: "Gateway/Webhook",
                    "Sending POST to {} with file {} for account {}",
                    request.url,
                    file.display(),
                    request.account_id
                ),
                None => info!(
                    target: "Gateway/Webhook",
                    "Sending POST to {} for account {}", request.url, request.account_id
                ),
            }

            match client.deliver(&request).await {
                Ok(status) if status >= 400 => warn!(
                    target: "Gateway/Webhook",
                    "Webhook {} answered {} for account {}",
                    request.url,
                    status,
                    request.account_id
                ),
                Ok(_) => {}
                Err(e) => warn!(
                    target: "Gateway/Webhook",
                    "Webhook delivery to {} failed for account {}: {e:?}",
                    request.url,
                    request.account_id
                ),
            }
        })
    }
}
