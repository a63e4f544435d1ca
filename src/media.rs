//! Per-account file surface: `<files_dir>/account_<id>/`.
//!
//! Holds downloaded attachments (`<message id><ext>`) and numbered history
//! sync snapshots (`history-<n>.json`).

use crate::types::account::AccountId;
use anyhow::{Context, Result, ensure};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[cfg(unix)]
const DIR_MODE: u32 = 0o751;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

pub struct MediaStore {
    root: PathBuf,
    history_counters: DashMap<AccountId, u64>,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            history_counters: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn account_dir(&self, account_id: AccountId) -> PathBuf {
        self.root.join(format!("account_{account_id}"))
    }

    pub async fn ensure_account_dir(&self, account_id: AccountId) -> Result<PathBuf> {
        let dir = self.account_dir(account_id);
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIR_MODE);
        builder
            .create(&dir)
            .await
            .with_context(|| format!("could not create {}", dir.display()))?;
        Ok(dir)
    }

    /// Writes an attachment as `<event_id><extension>` and returns its path.
    pub async fn save_attachment(
        &self,
        account_id: AccountId,
        event_id: &str,
        extension: &str,
        data: &[u8],
    ) -> Result<PathBuf> {
        let file_name = attachment_file_name(event_id, extension)?;
        let dir = self.ensure_account_dir(account_id).await?;
        let path = dir.join(file_name);
        write_private(&path, data).await?;
        Ok(path)
    }

    /// Writes the next `history-<n>.json` for the account, pretty-printed.
    pub async fn save_history(
        &self,
        account_id: AccountId,
        data: &serde_json::Value,
    ) -> Result<PathBuf> {
        let dir = self.ensure_account_dir(account_id).await?;
        let sequence = self.next_history_sequence(account_id);
        let path = dir.join(format!("history-{sequence}.json"));
        let mut body = serde_json::to_vec_pretty(data)?;
        body.push(b'\n');
        write_private(&path, &body).await?;
        Ok(path)
    }

    fn next_history_sequence(&self, account_id: AccountId) -> u64 {
        let mut counter = self.history_counters.entry(account_id).or_insert(0);
        *counter += 1;
        *counter
    }
}

async fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);
    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("could not open {}", path.display()))?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// File extension (with the leading dot) for a MIME type, if known.
///
/// Prefers the extension named after the subtype (`video/webm` -> `.webm`),
/// otherwise the first one `mime_guess` lists.
pub fn mime_extension(mime_type: &str) -> Option<String> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let extensions = mime_guess::get_mime_extensions_str(&essence)?;
    let subtype = essence.split_once('/').map(|(_, sub)| sub).unwrap_or_default();
    extensions
        .iter()
        .find(|ext| **ext == subtype)
        .or_else(|| extensions.first())
        .map(|ext| format!(".{ext}"))
}

/// Extension for a document: from its MIME type, else from its file name.
/// File name extensions that are not plain alphanumerics are dropped.
pub fn document_extension(mime_type: &str, file_name: Option<&str>) -> String {
    if let Some(ext) = mime_extension(mime_type) {
        return ext;
    }
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// Builds `<event_id><extension>`, refusing anything that could leave the
/// account directory. Event ids come from remote senders.
fn attachment_file_name(event_id: &str, extension: &str) -> Result<String> {
    ensure!(
        !event_id.is_empty()
            && event_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        "refusing unsafe message id {event_id:?}"
    );
    ensure!(
        extension.is_empty()
            || extension
                .strip_prefix('.')
                .is_some_and(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())),
        "refusing unsafe extension {extension:?}"
    );
    Ok(format!("{event_id}{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mime_extension() {
        assert_eq!(mime_extension("image/jpeg").as_deref(), Some(".jpeg"));
        assert_eq!(mime_extension("image/png").as_deref(), Some(".png"));
        assert_eq!(mime_extension("audio/ogg; codecs=opus").as_deref(), Some(".ogg"));
        assert_eq!(mime_extension("Video/WebM").as_deref(), Some(".webm"));
        assert_eq!(mime_extension("application/x-unknown"), None);
    }

    #[test]
    fn test_document_extension_falls_back_to_file_name() {
        assert_eq!(document_extension("application/pdf", Some("x.bin")), ".pdf");
        assert_eq!(
            document_extension("application/x-unknown", Some("report.final.odt")),
            ".odt"
        );
        assert_eq!(document_extension("application/x-unknown", Some("notes.m d")), "");
        assert_eq!(document_extension("application/x-unknown", None), "");
    }

    #[tokio::test]
    async fn test_unsafe_event_ids_are_refused() {
        let tmp = TempDir::new().unwrap();
        let store = MediaStore::new(tmp.path().join("files"));

        for id in ["../../escaped", "a/b", "..", "nul\0id", ""] {
            assert!(
                store.save_attachment(3, id, ".jpg", b"x").await.is_err(),
                "{id:?} accepted"
            );
        }
        assert!(store.save_attachment(3, "MSG", "./../x", b"x").await.is_err());
        assert!(!tmp.path().join("escaped.jpg").exists());
        assert!(!tmp.path().join("files").join("escaped.jpg").exists());
    }

    #[tokio::test]
    async fn test_save_attachment_layout() {
        let tmp = TempDir::new().unwrap();
        let store = MediaStore::new(tmp.path());

        let path = store
            .save_attachment(3, "MSGID", ".jpg", b"jpeg-bytes")
            .await
            .unwrap();

        assert_eq!(path, tmp.path().join("account_3").join("MSGID.jpg"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_history_files_are_numbered_per_account() {
        let tmp = TempDir::new().unwrap();
        let store = MediaStore::new(tmp.path());
        let data = serde_json::json!({"conversations": []});

        let first = store.save_history(1, &data).await.unwrap();
        let second = store.save_history(1, &data).await.unwrap();
        let other = store.save_history(2, &data).await.unwrap();

        assert!(first.ends_with("account_1/history-1.json"));
        assert!(second.ends_with("account_1/history-2.json"));
        assert!(other.ends_with("account_2/history-1.json"));

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&second).await.unwrap()).unwrap();
        assert_eq!(written, data);
    }
}
