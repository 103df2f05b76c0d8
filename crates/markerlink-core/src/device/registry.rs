//! Live device registry
//!
//! Tracks which (device type, address) pairs currently have an owner so that
//! two managers never drive the same physical device.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::DeviceType;
use crate::protocol::FAKE_ADDRESS;

type Entries = HashSet<(DeviceType, String)>;

/// Set of claimed devices, shared by every manager that uses it
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: Arc<Mutex<Entries>>,
}

static GLOBAL_REGISTRY: OnceLock<DeviceRegistry> = OnceLock::new();

impl DeviceRegistry {
    /// Create an empty registry, independent of the process-wide one
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static DeviceRegistry {
        GLOBAL_REGISTRY.get_or_init(DeviceRegistry::new)
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Entries are inserted/removed atomically, a poisoned set is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `(device_type, address)`.
    ///
    /// Returns `None` if the pair is already claimed. The fake address can be
    /// claimed any number of times and is never recorded.
    pub fn register(&self, device_type: DeviceType, address: &str) -> Option<RegistryGuard> {
        if address == FAKE_ADDRESS {
            return Some(RegistryGuard {
                registry: self.clone(),
                key: None,
            });
        }

        let key = (device_type, address.to_string());
        let mut entries = self.lock();
        if !entries.insert(key.clone()) {
            return None;
        }
        tracing::debug!("registered {} at {}", device_type, address);
        Some(RegistryGuard {
            registry: self.clone(),
            key: Some(key),
        })
    }

    /// Whether `(device_type, address)` is claimed
    pub fn contains(&self, device_type: DeviceType, address: &str) -> bool {
        self.lock().contains(&(device_type, address.to_string()))
    }

    /// Number of claimed devices
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no device is claimed
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Claim on a registry entry; the entry is released when the guard drops
#[derive(Debug)]
pub struct RegistryGuard {
    registry: DeviceRegistry,
    key: Option<(DeviceType, String)>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            tracing::debug!("released {} at {}", key.0, key.1);
            self.registry.lock().remove(&key);
        }
    }
}
