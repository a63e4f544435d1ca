use crate::webhook::WebhookConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IDENTITY_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CONNECT_CONFIRM_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_QR_IMAGE_SIZE: u32 = 256;
pub const DEFAULT_DEVICE_OS: &str = "WADAK";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Root of the per-account media directories (`account_<id>/`).
    pub files_dir: PathBuf,
    pub identity_ttl: Duration,
    /// How long a non-immediate connect waits before checking the session.
    pub connect_confirm_delay: Duration,
    pub qr_image_size: u32,
    /// OS name advertised when a fresh device identity is created.
    pub device_os: String,
    pub webhook: WebhookConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            files_dir: default_files_dir(),
            identity_ttl: DEFAULT_IDENTITY_TTL,
            connect_confirm_delay: DEFAULT_CONNECT_CONFIRM_DELAY,
            qr_image_size: DEFAULT_QR_IMAGE_SIZE,
            device_os: DEFAULT_DEVICE_OS.to_string(),
            webhook: WebhookConfig::default(),
        }
    }
}

fn default_files_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("files")))
        .unwrap_or_else(|| PathBuf::from("files"))
}
