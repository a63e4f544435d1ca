use super::EventDispatcher;
use crate::media::{document_extension, mime_extension};
use crate::protocol::{MediaAttachment, MediaKind};
use crate::types::events::MessageEvent;
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

/// Used when an image or audio MIME type has no known extension.
const FALLBACK_EXTENSION: &str = ".bin";

fn attachment_extension(kind: MediaKind, media: &MediaAttachment) -> String {
    match kind {
        MediaKind::Document => document_extension(&media.mimetype, media.file_name.as_deref()),
        _ => mime_extension(&media.mimetype).unwrap_or_else(|| FALLBACK_EXTENSION.to_string()),
    }
}

impl EventDispatcher {
    /// Logs the message and saves its attachments under the account
    /// directory. Returns the path of the last file written.
    pub(super) async fn on_message(&self, msg: &MessageEvent) -> Result<Option<PathBuf>> {
        let account_id = self.account_id();
        let info = &msg.info;

        let mut meta = vec![
            format!("pushname: {}", info.push_name),
            format!("timestamp: {}", info.timestamp),
        ];
        if !info.message_type.is_empty() {
            meta.push(format!("type: {}", info.message_type));
        }
        if !info.category.is_empty() {
            meta.push(format!("category: {}", info.category));
        }
        if msg.is_view_once {
            meta.push("view once".to_string());
        }
        if msg.is_ephemeral {
            meta.push("ephemeral".to_string());
        }
        info!(
            target: "Gateway/Events",
            "Message {} received from {} ({})",
            info.id,
            info.source_string(),
            meta.join(", ")
        );

        let attachments = [
            (MediaKind::Image, &msg.message.image),
            (MediaKind::Audio, &msg.message.audio),
            (MediaKind::Document, &msg.message.document),
        ];

        let mut saved = None;
        for (kind, media) in attachments {
            let Some(media) = media else { continue };

            let client = self
                .client()
                .context("protocol client dropped before download")?;
            let data = client
                .download(media)
                .await
                .with_context(|| format!("failed to download {}", kind.mms_type()))?;
            let extension = attachment_extension(kind, media);
            let path = self
                .manager
                .media
                .save_attachment(account_id, &info.id, &extension, &data)
                .await
                .with_context(|| format!("failed to save {}", kind.mms_type()))?;

            info!(target: "Gateway/Events", "{} saved to {}", kind.mms_type(), path.display());
            saved = Some(path);
        }

        Ok(saved)
    }
}
