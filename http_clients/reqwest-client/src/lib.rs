use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use std::path::Path;
use std::sync::Arc;
use whatsapp_gateway::types::account::AccountId;
use whatsapp_gateway::webhook::{
    FILE_FIELD, WebhookClient, WebhookClientFactory, WebhookConfig, WebhookRequest,
};

/// Webhook client backed by a `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestWebhookClient {
    client: reqwest::Client,
}

impl ReqwestWebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookClient for ReqwestWebhookClient {
    async fn deliver(&self, request: &WebhookRequest) -> Result<u16> {
        let builder = self.client.post(&request.url);
        let builder = match &request.file {
            None => builder.form(&request.fields),
            Some(path) => builder.multipart(multipart_form(&request.fields, path).await?),
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("POST {} failed", request.url))?;
        debug!(target: "Gateway/Webhook", "{} answered {}", request.url, response.status());
        Ok(response.status().as_u16())
    }
}

/// Hands every account its own [`ReqwestWebhookClient`].
#[derive(Debug, Clone)]
pub struct ReqwestWebhookClientFactory {
    fallback: ReqwestWebhookClient,
}

impl ReqwestWebhookClientFactory {
    /// `config` also shapes the client used when a per-account build fails.
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        Ok(Self {
            fallback: ReqwestWebhookClient::new(config)?,
        })
    }
}

impl WebhookClientFactory for ReqwestWebhookClientFactory {
    fn create_client(
        &self,
        account_id: AccountId,
        config: &WebhookConfig,
    ) -> Arc<dyn WebhookClient> {
        match ReqwestWebhookClient::new(config) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(
                    target: "Gateway/Webhook",
                    "Using shared HTTP client for account {account_id}: {e:?}"
                );
                Arc::new(self.fallback.clone())
            }
        }
    }
}

/// Text fields first, then the file streamed from disk under `file`.
async fn multipart_form(fields: &[(String, String)], path: &Path) -> Result<Form> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let form = fields
        .iter()
        .fold(Form::new(), |form, (name, value)| {
            form.text(name.clone(), value.clone())
        });
    let part = Part::stream(file)
        .file_name(file_name)
        .mime_str("application/octet-stream")?;
    Ok(form.part(FILE_FIELD, part))
}
