//! Boundary for tuples addressed to other nodes.
//!
//! When a routed tuple's location column names an address other than the
//! local one, the router hands it to the [`Network`] instead of storing it.
//! Delivery is fire-and-forget from the router's point of view and an
//! implementation must never stall the calling thread.

use crate::datum::Str;
use crate::tuple::Tuple;
use std::sync::Mutex;
use tracing::debug;

pub trait Network: Send + Sync {
    /// Hands off a tuple bound for `addr`. Must not block.
    fn send(&self, addr: &Str, table: &str, tuple: &Tuple);
}

/// Discards all remote traffic. The default for single-node runtimes.
pub struct NullNetwork;

impl Network for NullNetwork {
    fn send(&self, addr: &Str, table: &str, tuple: &Tuple) {
        debug!("dropping remote tuple for {addr}: {table}{tuple}");
    }
}

/// Captures outbound tuples for inspection. Test use only.
pub struct RecordingNetwork {
    sent: Mutex<Vec<(Str, String, Tuple)>>,
}

impl RecordingNetwork {
    pub fn new() -> RecordingNetwork {
        RecordingNetwork {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Drains everything sent so far.
    pub fn take(&self) -> Vec<(Str, String, Tuple)> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

impl Default for RecordingNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Network for RecordingNetwork {
    fn send(&self, addr: &Str, table: &str, tuple: &Tuple) {
        self.sent
            .lock()
            .unwrap()
            .push((addr.clone(), table.to_string(), tuple.clone()));
    }
}
