//! The pure in-memory registry. No I/O, no locking; callers own both.

use super::error::RegistryError;
use super::{BlockedDevice, Device, Vlan};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    vlans: HashMap<String, Vlan>,
    devices: HashMap<String, Device>,
    blocked: HashSet<String>,
    /// Id of the VLAN currently marked default, if any.
    default_vlan_id: Option<String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vlans(&self) -> Vec<Vlan> {
        let mut vlans: Vec<Vlan> = self.vlans.values().cloned().collect();
        // Numeric ordering of textual ids; anything non-numeric sorts as 0.
        // The id tiebreak keeps the order deterministic between equals.
        vlans.sort_by(|a, b| {
            let na = a.id.parse::<i64>().unwrap_or(0);
            let nb = b.id.parse::<i64>().unwrap_or(0);
            na.cmp(&nb).then_with(|| a.id.cmp(&b.id))
        });
        vlans
    }

    pub fn vlan(&self, id: &str) -> Result<Vlan, RegistryError> {
        self.vlans
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::VlanNotFound(id.to_string()))
    }

    pub fn create_vlan(&mut self, vlan: Vlan) -> Result<(), RegistryError> {
        if self.vlans.contains_key(&vlan.id) {
            return Err(RegistryError::VlanExists(vlan.id));
        }
        if vlan.default {
            if let Some(existing) = &self.default_vlan_id {
                return Err(RegistryError::DefaultVlanExists(existing.clone()));
            }
            self.default_vlan_id = Some(vlan.id.clone());
        }
        self.vlans.insert(vlan.id.clone(), vlan);
        Ok(())
    }

    /// Replace a VLAN wholesale. The default marker follows the `default`
    /// field: promoting a second VLAN while another default exists fails,
    /// demoting the current default clears it.
    pub fn update_vlan(&mut self, vlan: Vlan) -> Result<(), RegistryError> {
        if !self.vlans.contains_key(&vlan.id) {
            return Err(RegistryError::VlanNotFound(vlan.id));
        }
        match (self.default_vlan_id.clone(), vlan.default) {
            (Some(existing), true) if existing != vlan.id => {
                return Err(RegistryError::DefaultVlanExists(existing));
            }
            (_, true) => self.default_vlan_id = Some(vlan.id.clone()),
            (Some(existing), false) if existing == vlan.id => self.default_vlan_id = None,
            _ => {}
        }
        self.vlans.insert(vlan.id.clone(), vlan);
        Ok(())
    }

    /// Delete a VLAN. Devices referencing it are left alone; their
    /// authentication falls back to the default response until reassigned.
    pub fn delete_vlan(&mut self, id: &str) -> Result<(), RegistryError> {
        if self.vlans.remove(id).is_none() {
            return Err(RegistryError::VlanNotFound(id.to_string()));
        }
        if self.default_vlan_id.as_deref() == Some(id) {
            self.default_vlan_id = None;
        }
        Ok(())
    }

    pub fn default_vlan(&self) -> Result<Vlan, RegistryError> {
        let id = self
            .default_vlan_id
            .as_deref()
            .ok_or(RegistryError::DefaultVlanNotFound)?;
        self.vlan(id)
    }

    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.username.to_lowercase());
        devices
    }

    pub fn device(&self, username: &str) -> Result<Device, RegistryError> {
        self.devices
            .get(username)
            .cloned()
            .ok_or_else(|| RegistryError::DeviceNotFound(username.to_string()))
    }

    /// Best-effort lookup by display name; descriptions are not unique, the
    /// first match in iteration order wins.
    pub fn device_by_description(&self, description: &str) -> Result<Device, RegistryError> {
        self.devices
            .values()
            .find(|d| !d.description.is_empty() && d.description == description)
            .cloned()
            .ok_or_else(|| RegistryError::DeviceNotFound(description.to_string()))
    }

    pub fn create_device(&mut self, device: Device) -> Result<(), RegistryError> {
        if self.devices.contains_key(&device.username) {
            return Err(RegistryError::DeviceExists(device.username));
        }
        if !self.vlans.contains_key(&device.vlan_id) {
            return Err(RegistryError::InvalidVlanReference {
                username: device.username,
                vlan_id: device.vlan_id,
            });
        }
        self.devices.insert(device.username.clone(), device);
        Ok(())
    }

    /// Replace a device wholesale. The VLAN reference is not re-validated
    /// here; only creation checks it.
    pub fn update_device(&mut self, device: Device) -> Result<(), RegistryError> {
        if !self.devices.contains_key(&device.username) {
            return Err(RegistryError::DeviceNotFound(device.username));
        }
        self.devices.insert(device.username.clone(), device);
        Ok(())
    }

    /// Delete a device and any blocklist entry with the same username.
    pub fn delete_device(&mut self, username: &str) -> Result<(), RegistryError> {
        if self.devices.remove(username).is_none() {
            return Err(RegistryError::DeviceNotFound(username.to_string()));
        }
        self.blocked.remove(username);
        Ok(())
    }

    pub fn blocked(&self) -> Vec<BlockedDevice> {
        let mut blocked: Vec<BlockedDevice> = self
            .blocked
            .iter()
            .map(|username| BlockedDevice {
                username: username.clone(),
            })
            .collect();
        blocked.sort_by_key(|b| b.username.to_lowercase());
        blocked
    }

    pub fn is_blocked(&self, username: &str) -> bool {
        self.blocked.contains(username)
    }

    pub fn block(&mut self, username: &str) -> Result<(), RegistryError> {
        if !self.blocked.insert(username.to_string()) {
            return Err(RegistryError::AlreadyBlocked(username.to_string()));
        }
        Ok(())
    }

    /// Remove a blocklist entry. A username without a device gets one
    /// created so the station authenticates again: assigned to the default
    /// VLAN, or the first VLAN when no default exists. Fails when the
    /// registry holds no VLANs at all.
    pub fn unblock(&mut self, username: &str) -> Result<(), RegistryError> {
        if !self.blocked.remove(username) {
            return Err(RegistryError::NotBlocked(username.to_string()));
        }

        if !self.devices.contains_key(username) {
            let vlan = match self.default_vlan() {
                Ok(vlan) => vlan,
                Err(_) => {
                    let vlans = self.vlans();
                    match vlans.into_iter().next() {
                        Some(vlan) => vlan,
                        None => {
                            // Nothing to assign; restore the entry so the
                            // failed call leaves no partial state behind.
                            self.blocked.insert(username.to_string());
                            return Err(RegistryError::NoVlanAvailable);
                        }
                    }
                }
            };

            self.devices.insert(
                username.to_string(),
                Device {
                    username: username.to_string(),
                    password: username.to_string(),
                    vlan_id: vlan.id,
                    description: String::new(),
                },
            );
        }

        Ok(())
    }
}
