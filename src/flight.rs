//! Single-flight coordinator.
//!
//! At most one operation per key may be in flight. A second caller for the
//! same key is turned away instead of queued; the slot frees when the
//! returned ticket is dropped, including when the owning future is cancelled.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone)]
pub struct SingleFlight { inflight: Arc<Mutex<HashSet<String>>> }

impl SingleFlight {
    pub fn new() -> Self { Self::default() }

    pub fn try_begin(&self, key: &str) -> Option<FlightTicket> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if !inflight.insert(key.to_string()) {
            return None;
        }
        Some(FlightTicket { key: key.to_string(), inflight: Arc::clone(&self.inflight) })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).contains(key)
    }
}

#[derive(Debug)]
pub struct FlightTicket {
    key: String,
    inflight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.key);
    }
}
