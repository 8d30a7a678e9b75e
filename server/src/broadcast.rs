//! Best-effort delivery of one payload to every registered session

use crate::error::RelayError;
use crate::session_registry::{Frame, SessionRegistry};
use log::{debug, warn};
use serde::Serialize;

/// Outcome of a single broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Serializes payloads and fans them out to sessions
#[derive(Debug, Default)]
pub struct Broadcaster {
    frames_broadcast: u64,
    deliveries: u64,
    delivery_failures: u64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `payload` to every session in the registry.
    ///
    /// The payload is serialized once, before anything is sent; an encode
    /// failure aborts the whole pass. Each delivery is attempted
    /// independently and a failure only affects that recipient.
    pub fn broadcast<T: Serialize + ?Sized>(
        &mut self,
        registry: &SessionRegistry,
        payload: &T,
    ) -> Result<BroadcastReport, RelayError> {
        let frame: Frame = serde_json::to_string(payload)?.into();
        self.frames_broadcast += 1;

        let mut report = BroadcastReport::default();
        for session in registry.all_sessions() {
            match session.deliver(&frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "broadcast to {} ({}) failed: {}",
                        session.addr, session.id, e
                    );
                    report.failed += 1;
                }
            }
        }

        self.deliveries += report.delivered as u64;
        self.delivery_failures += report.failed as u64;
        debug!(
            "broadcast #{}: {} delivered, {} failed ({} failures total)",
            self.frames_broadcast, report.delivered, report.failed, self.delivery_failures
        );

        Ok(report)
    }

    pub fn frames_broadcast(&self) -> u64 {
        self.frames_broadcast
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures
    }
}
