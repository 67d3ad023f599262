//! Device registry: the authoritative runtime state.
//!
//! The registry holds VLAN definitions, registered devices, and the
//! blocklist. [`MemoryRegistry`] is the pure in-memory data structure;
//! the [`Registry`] trait is the seam the RADIUS pipeline and the bot
//! program against, with two implementations:
//!
//! - [`MemoryStore`]: a mutex around [`MemoryRegistry`], no persistence
//! - [`YamlStore`](yaml::YamlStore): the same core composed with a YAML
//!   file and a filesystem watcher
//!
//! Invariants enforced here:
//!
//! - at most one VLAN is marked default
//! - a device's VLAN must exist at creation time
//! - deleting a device also removes its blocklist entry
//! - unblocking a username without a device materialises one on the
//!   default VLAN (or the first VLAN when no default exists)

pub mod error;
pub mod memory;
pub mod yaml;

pub use error::RegistryError;
pub use memory::MemoryRegistry;
pub use yaml::{StoreError, YamlStore};

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A layer-2 segment stations can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    /// Unique key; compared numerically for ordering but kept as text to
    /// preserve the configured form.
    pub id: String,
    pub name: String,
    /// Unknown stations land here when set. At most one VLAN has this.
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
    /// Tunnel-Type override; 0 means the protocol default of 13 (VLAN).
    #[serde(default, rename = "tunnelType", skip_serializing_if = "is_zero")]
    pub tunnel_type: u32,
    /// Tunnel-Medium-Type override; 0 means the protocol default of 6 (IEEE-802).
    #[serde(default, rename = "tunnelMediumType", skip_serializing_if = "is_zero")]
    pub tunnel_medium_type: u32,
}

/// A registered station, authenticated by username/password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Primary key; usually the station MAC in the operator's format.
    pub username: String,
    pub password: String,
    #[serde(rename = "vlan")]
    pub vlan_id: String,
    /// Operator-assigned display name; queryable as a best-effort
    /// secondary key when non-empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Blocklist entry. Exists independently of any device with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDevice {
    pub username: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// The pluggable-store seam.
///
/// All methods return owned copies; implementations serialise access
/// internally so the trait object can be shared across the RADIUS
/// handlers, the bot handlers, and the file watcher.
pub trait Registry: Send + Sync {
    /// All VLANs, sorted by id interpreted as an integer.
    fn vlans(&self) -> Result<Vec<Vlan>, RegistryError>;
    fn vlan(&self, id: &str) -> Result<Vlan, RegistryError>;
    fn create_vlan(&self, vlan: Vlan) -> Result<(), RegistryError>;
    fn update_vlan(&self, vlan: Vlan) -> Result<(), RegistryError>;
    fn delete_vlan(&self, id: &str) -> Result<(), RegistryError>;
    fn default_vlan(&self) -> Result<Vlan, RegistryError>;

    /// All devices, sorted by lowercased username.
    fn devices(&self) -> Result<Vec<Device>, RegistryError>;
    fn device(&self, username: &str) -> Result<Device, RegistryError>;
    fn device_by_description(&self, description: &str) -> Result<Device, RegistryError>;
    fn create_device(&self, device: Device) -> Result<(), RegistryError>;
    fn update_device(&self, device: Device) -> Result<(), RegistryError>;
    fn delete_device(&self, username: &str) -> Result<(), RegistryError>;

    /// All blocklist entries, sorted by lowercased username.
    fn blocked(&self) -> Result<Vec<BlockedDevice>, RegistryError>;
    fn is_blocked(&self, username: &str) -> Result<bool, RegistryError>;
    fn block(&self, username: &str) -> Result<(), RegistryError>;
    fn unblock(&self, username: &str) -> Result<(), RegistryError>;
}

/// In-memory [`Registry`] with no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryRegistry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registry(registry: MemoryRegistry) -> Self {
        MemoryStore {
            inner: Mutex::new(registry),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRegistry> {
        // A poisoned lock means a panic mid-mutation; the registry has no
        // partial states, so continuing with the data is sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Registry for MemoryStore {
    fn vlans(&self) -> Result<Vec<Vlan>, RegistryError> {
        Ok(self.lock().vlans())
    }

    fn vlan(&self, id: &str) -> Result<Vlan, RegistryError> {
        self.lock().vlan(id)
    }

    fn create_vlan(&self, vlan: Vlan) -> Result<(), RegistryError> {
        self.lock().create_vlan(vlan)
    }

    fn update_vlan(&self, vlan: Vlan) -> Result<(), RegistryError> {
        self.lock().update_vlan(vlan)
    }

    fn delete_vlan(&self, id: &str) -> Result<(), RegistryError> {
        self.lock().delete_vlan(id)
    }

    fn default_vlan(&self) -> Result<Vlan, RegistryError> {
        self.lock().default_vlan()
    }

    fn devices(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(self.lock().devices())
    }

    fn device(&self, username: &str) -> Result<Device, RegistryError> {
        self.lock().device(username)
    }

    fn device_by_description(&self, description: &str) -> Result<Device, RegistryError> {
        self.lock().device_by_description(description)
    }

    fn create_device(&self, device: Device) -> Result<(), RegistryError> {
        self.lock().create_device(device)
    }

    fn update_device(&self, device: Device) -> Result<(), RegistryError> {
        self.lock().update_device(device)
    }

    fn delete_device(&self, username: &str) -> Result<(), RegistryError> {
        self.lock().delete_device(username)
    }

    fn blocked(&self) -> Result<Vec<BlockedDevice>, RegistryError> {
        Ok(self.lock().blocked())
    }

    fn is_blocked(&self, username: &str) -> Result<bool, RegistryError> {
        Ok(self.lock().is_blocked(username))
    }

    fn block(&self, username: &str) -> Result<(), RegistryError> {
        self.lock().block(username)
    }

    fn unblock(&self, username: &str) -> Result<(), RegistryError> {
        self.lock().unblock(username)
    }
}
