use super::EventDispatcher;
use crate::types::events::{Receipt, ReceiptType};
use log::{debug, info};

/// Webhook state label for a receipt; `None` for sub-types that are never
/// forwarded.
pub fn receipt_state(receipt_type: &ReceiptType) -> Option<&'static str> {
    match receipt_type {
        ReceiptType::Read => Some("Read"),
        ReceiptType::ReadSelf => Some("ReadSelf"),
        ReceiptType::Delivered => Some("Delivered"),
        _ => None,
    }
}

impl EventDispatcher {
    pub(super) fn on_receipt(&self, receipt: &Receipt) -> Option<&'static str> {
        match receipt.receipt_type {
            ReceiptType::Read | ReceiptType::ReadSelf => info!(
                target: "Gateway/Events",
                "Messages {:?} were read by {} at {}",
                receipt.message_ids,
                receipt.source_string(),
                receipt.timestamp
            ),
            ReceiptType::Delivered => info!(
                target: "Gateway/Events",
                "Message {} delivered to {} at {}",
                receipt.message_ids.first().map(String::as_str).unwrap_or_default(),
                receipt.source_string(),
                receipt.timestamp
            ),
            ref other => debug!(
                target: "Gateway/Events",
                "Discarding {other:?} receipt for account {}",
                self.account_id()
            ),
        }
        receipt_state(&receipt.receipt_type)
    }
}
