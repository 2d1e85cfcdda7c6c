//! Fan-out of one line to every active session.

use futures::future::join_all;
use tracing::debug;

use kchat_protocol::ServerMessage;

use crate::registry::RegistryHandle;

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the line was flushed to
    pub delivered: usize,
    /// Recipients whose write failed or timed out
    pub failed: usize,
}

/// Delivers lines to the outputs registered in the registry.
///
/// Delivery is best-effort and at most once per recipient. A recipient whose
/// write fails is skipped and logged; it stays registered until its own
/// session notices the broken connection and tears down.
#[derive(Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
}

impl Dispatcher {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    /// Sends `msg` to every output active at the time of the call.
    ///
    /// Never fails. The output map is snapshotted first, so no registry lock
    /// is held while writing and concurrent broadcasts from other sessions
    /// proceed independently. Recipients are written concurrently, so a
    /// stalled one delays the broadcast by at most one write timeout.
    pub async fn broadcast(&self, msg: &ServerMessage) -> BroadcastReport {
        let line = msg.to_string();
        let recipients = self.registry.output_snapshot().await;
        let mut report = BroadcastReport::default();

        let deliveries = recipients.into_iter().map(|(session_id, output)| {
            let line = line.as_str();
            async move { (session_id, output.send_line(line).await) }
        });

        for (session_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to deliver broadcast"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
