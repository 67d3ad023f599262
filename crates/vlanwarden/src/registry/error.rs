use thiserror::Error;

/// Registry failure taxonomy.
///
/// Every mutation fails fast with one of these; no mutation partially
/// applies. The RADIUS pipeline treats "not found" variants as branches
/// rather than failures, so they are distinguishable via
/// [`RegistryError::is_not_found`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("device {0} already exists")]
    DeviceExists(String),
    #[error("VLAN {0} not found")]
    VlanNotFound(String),
    #[error("VLAN {0} already exists")]
    VlanExists(String),
    #[error("no default VLAN configured")]
    DefaultVlanNotFound,
    #[error("a default VLAN already exists: {0}")]
    DefaultVlanExists(String),
    #[error("device {0} is already blocked")]
    AlreadyBlocked(String),
    #[error("device {0} is not blocked")]
    NotBlocked(String),
    #[error("device {username} references unknown VLAN {vlan_id}")]
    InvalidVlanReference { username: String, vlan_id: String },
    #[error("no VLAN available for assignment")]
    NoVlanAvailable,
    /// The mutation applied in memory but writing it back to disk failed.
    #[error("failed to persist registry: {0}")]
    Persistence(String),
}

impl RegistryError {
    /// Lookup misses, as opposed to constraint violations.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::DeviceNotFound(_)
                | RegistryError::VlanNotFound(_)
                | RegistryError::DefaultVlanNotFound
                | RegistryError::NotBlocked(_)
        )
    }
}
