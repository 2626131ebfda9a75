//! Coalesces concurrent fetches for the same `(kind, identifier)` into one
//! outbound call. Waiters acquire the key's gate, re-check freshness, and
//! find the first flight's write already persisted. In-process only; no
//! cross-instance coordination is attempted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::tracking::DataKind;

#[derive(Default)]
pub struct SingleFlight {
    gates: Mutex<HashMap<(DataKind, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate serializing fetches for one key. Lock it for the duration of
    /// the check-fetch-write cycle.
    pub fn gate(&self, kind: DataKind, identifier: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(
            gates
                .entry((kind, identifier.to_string()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_gate() {
        let flights = SingleFlight::new();
        let a = flights.gate(DataKind::Account, "puuid-1");
        let b = flights.gate(DataKind::Account, "puuid-1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_keys_get_distinct_gates() {
        let flights = SingleFlight::new();
        let a = flights.gate(DataKind::Account, "puuid-1");
        let b = flights.gate(DataKind::Rank, "puuid-1");
        let c = flights.gate(DataKind::Account, "puuid-2");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
