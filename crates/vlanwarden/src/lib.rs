//! MAC-authentication RADIUS server with operator approval over Telegram.
//!
//! Stations authenticate with their MAC address as both username and
//! password. Known devices get their assigned VLAN back in RFC 2868
//! tunnel attributes; unknown devices land on the default VLAN (when one
//! is configured) while the operators decide over chat whether to add,
//! ignore, or block them. The device registry is a watched YAML file, so
//! it can also be edited by hand.

pub mod bot;
pub mod cache;
pub mod config;
pub mod registry;
pub mod serve;
pub mod server;
pub mod shutdown;

pub use bot::{BotError, BotServer};
pub use cache::TokenCache;
pub use config::{Config, ConfigError, Verbosity};
pub use registry::{
    BlockedDevice, Device, MemoryRegistry, MemoryStore, Registry, RegistryError, StoreError, Vlan,
    YamlStore,
};
pub use serve::{serve, ServeError};
pub use server::{LoginAttempt, RadiusServer, ServerError};
pub use shutdown::ShutdownToken;
