use super::EventDispatcher;
use crate::protocol::{Presence, ProtocolClient};
use crate::types::events::{AppStateSyncComplete, CRITICAL_BLOCK_PATCH, LoggedOut, PairSuccess};
use log::{debug, error, info, warn};

impl EventDispatcher {
    pub(super) async fn on_pair_success(&self, pair: &PairSuccess) {
        let account_id = self.account_id();
        info!(
            target: "Gateway/Events",
            "QR pair success for account {account_id}: {} (business name '{}', platform {})",
            pair.id, pair.business_name, pair.platform
        );
        self.manager
            .record_pairing(account_id, &self.session.token, &pair.id)
            .await;
    }

    /// Storage is updated before the run-loop is signalled. Ignored when
    /// the dispatcher belongs to a run that has since been replaced.
    pub(super) async fn on_logged_out(&self, logged_out: &LoggedOut) {
        let account_id = self.account_id();
        let generation = self.session.generation;
        if !self.manager.registry.is_current(account_id, generation) {
            debug!(
                target: "Gateway/Events",
                "Ignoring logout from replaced session {generation} of account {account_id}"
            );
            return;
        }

        info!(
            target: "Gateway/Events",
            "Account {account_id} logged out (reason: {}, on connect: {})",
            logged_out.reason, logged_out.on_connect
        );
        if let Err(e) = self.manager.repository.set_connected(account_id, false).await {
            error!(target: "Gateway/Events", "Failed to set account {account_id} disconnected: {e:?}");
        }
        self.manager.registry.terminate_generation(account_id, generation);
    }

    /// Handles both `Connected` and `PushNameSetting`.
    pub(super) async fn on_connected(&self) {
        let account_id = self.account_id();
        let Some(client) = self.client() else {
            debug!(target: "Gateway/Events", "Connected event after teardown of account {account_id}");
            return;
        };

        if !client.push_name().is_empty() {
            self.mark_available(client.as_ref()).await;
        }

        info!(target: "Gateway/Events", "Setting up status connection for account {account_id}");
        if let Err(e) = self.manager.repository.set_connected(account_id, true).await {
            error!(target: "Gateway/Events", "Failed to set account {account_id} connected: {e:?}");
        }
    }

    pub(super) async fn on_app_state_sync_complete(&self, sync: &AppStateSyncComplete) {
        if sync.name != CRITICAL_BLOCK_PATCH {
            return;
        }
        if let Some(client) = self.client()
            && !client.push_name().is_empty()
        {
            self.mark_available(client.as_ref()).await;
        }
    }

    async fn mark_available(&self, client: &dyn ProtocolClient) {
        match client.send_presence(Presence::Available).await {
            Ok(()) => info!(target: "Gateway/Events", "Marked account {} as available", self.account_id()),
            Err(e) => warn!(target: "Gateway/Events", "Failed to send available presence: {e:?}"),
        }
    }
}
