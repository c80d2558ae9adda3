//! Scripted liveness probe.

use std::collections::HashSet;

use async_trait::async_trait;
use locator_core::{AdapterName, Address};
use locator_discovery::ObjectProbe;
use parking_lot::Mutex;

/// Probe that reports adapters reachable unless marked otherwise.
///
/// Every probed address is recorded, so tests can check which candidates
/// were tried.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    unreachable: Mutex<HashSet<AdapterName>>,
    probed: Mutex<Vec<Address>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unreachable(&self, adapter: AdapterName) {
        self.unreachable.lock().insert(adapter);
    }

    pub fn mark_reachable(&self, adapter: &AdapterName) {
        self.unreachable.lock().remove(adapter);
    }

    pub fn probed(&self) -> Vec<Address> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl ObjectProbe for ScriptedProbe {
    async fn is_reachable(&self, address: &Address) -> bool {
        self.probed.lock().push(address.clone());
        match address.adapter() {
            Some(adapter) => !self.unreachable.lock().contains(adapter),
            None => true,
        }
    }
}
