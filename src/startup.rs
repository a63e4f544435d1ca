use crate::gateway::Gateway;
use crate::types::account::IdentitySnapshot;
use log::{error, info, warn};

impl Gateway {
    /// Reconnects every account persisted as connected.
    ///
    /// Seeds the identity cache from the stored row before starting each
    /// session. A failure for one account is logged and the rest continue.
    /// Returns the number of sessions started.
    pub async fn connect_on_startup(&self) -> usize {
        let manager = self.manager();
        let accounts = match manager.repository.get_connected_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(target: "Gateway/Startup", "Could not load connected accounts: {e:?}");
                return 0;
            }
        };

        let mut started = 0;
        for account in accounts {
            info!(target: "Gateway/Startup", "Connecting account {} on startup", account.id);

            manager
                .identities
                .set(&account.bearer_token, IdentitySnapshot::from(&account))
                .await;

            let subscriptions = account.subscriptions();
            info!(
                target: "Gateway/Startup",
                "Attempt to connect account {} ({}) with events {}",
                account.id,
                account.network_address,
                subscriptions.to_csv()
            );

            match manager.start_session(
                account.id,
                &account.network_address,
                &account.bearer_token,
                subscriptions,
            ) {
                Ok(_) => started += 1,
                Err(e) => warn!(target: "Gateway/Startup", "Could not start account {}: {e}", account.id),
            }
        }
        started
    }
}
