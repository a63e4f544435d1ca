use thiserror::Error;

/// Failures surfaced to the control plane.
///
/// Background failures (webhook delivery, media persistence) never reach this
/// type; they are logged where they happen.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no session")]
    NoSession,
    #[error("not connected")]
    NotConnected,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("client already connected")]
    AlreadyConnected,
    #[error("already logged in")]
    AlreadyLoggedIn,
    #[error("failed to connect")]
    FailedToConnect,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no webhook configured for this account")]
    MissingWebhookContext,
    #[error("unauthorized")]
    Unauthorized,
    #[error("account storage error: {0}")]
    Repository(#[source] anyhow::Error),
    #[error("protocol client error: {0}")]
    Protocol(#[source] anyhow::Error),
    #[error("device store error: {0}")]
    Device(#[source] anyhow::Error),
}

impl GatewayError {
    /// True for the guard failures of the session state machine: the call was
    /// rejected before anything changed.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            GatewayError::NoSession
                | GatewayError::NotConnected
                | GatewayError::NotLoggedIn
                | GatewayError::AlreadyConnected
                | GatewayError::AlreadyLoggedIn
        )
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
