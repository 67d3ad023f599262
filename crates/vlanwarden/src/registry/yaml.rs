//! YAML-backed registry store.
//!
//! Composes [`MemoryRegistry`] with a human-editable YAML file: the file is
//! loaded once at startup, written back after every mutation, and watched
//! for external edits, which are reloaded after a short debounce.

use super::error::RegistryError;
use super::memory::MemoryRegistry;
use super::{BlockedDevice, Device, Registry, Vlan};
use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Quiet period after the last write event before the file is reloaded.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("registry file path must be absolute: {0}")]
    RelativePath(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// On-disk document shape: three sequences, VLANs ingested before devices
/// so device references validate.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    users: Vec<Device>,
    #[serde(default)]
    vlans: Vec<Vlan>,
    #[serde(default)]
    blocked: Vec<BlockedDevice>,
}

fn load_file(path: &Path) -> Result<MemoryRegistry, StoreError> {
    let contents = fs::read_to_string(path)?;
    let file: RegistryFile = serde_yaml::from_str(&contents)?;

    let mut registry = MemoryRegistry::new();
    for vlan in file.vlans {
        registry.create_vlan(vlan)?;
    }
    for device in file.users {
        registry.create_device(device)?;
    }
    for entry in file.blocked {
        registry.block(&entry.username)?;
    }
    Ok(registry)
}

fn dump_file(path: &Path, registry: &MemoryRegistry) -> Result<(), StoreError> {
    let file = RegistryFile {
        users: registry.devices(),
        vlans: registry.vlans(),
        blocked: registry.blocked(),
    };
    let contents = serde_yaml::to_string(&file)?;
    fs::write(path, contents)?;
    Ok(())
}

/// The YAML-backed [`Registry`].
///
/// Mutations dump the full registry back to the file while the registry
/// lock is held, so the file always reflects a consistent snapshot and a
/// mutation is durable before its caller sees success. A failed dump
/// surfaces as [`RegistryError::Persistence`] but the in-memory mutation
/// stays applied.
pub struct YamlStore {
    path: PathBuf,
    inner: Mutex<MemoryRegistry>,
    reloads: AtomicUsize,
}

impl YamlStore {
    /// Load the registry from `path`, which must be absolute.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(StoreError::RelativePath(path));
        }
        let registry = load_file(&path)?;
        debug!(file = %path.display(), "opened registry file");
        Ok(YamlStore {
            path,
            inner: Mutex::new(registry),
            reloads: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRegistry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a mutation and write the result back, all under the lock.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut MemoryRegistry) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut inner = self.lock();
        let value = apply(&mut inner)?;
        if let Err(e) = dump_file(&self.path, &inner) {
            return Err(RegistryError::Persistence(e.to_string()));
        }
        Ok(value)
    }

    /// Write the current registry to the file.
    pub fn save(&self) -> Result<(), StoreError> {
        let inner = self.lock();
        dump_file(&self.path, &inner)
    }

    /// Re-read the file and replace the in-memory registry on success.
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        match load_file(&self.path) {
            Ok(registry) => {
                *self.lock() = registry;
                info!(file = %self.path.display(), "registry file reloaded");
            }
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "registry reload failed, keeping previous state");
            }
        }
    }

    /// Number of reload attempts performed by the watcher.
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Watch the registry file and reload it on external edits.
    ///
    /// Write events re-arm a [`RELOAD_DEBOUNCE`] timer; the reload runs
    /// once the file has been quiet for that long. Runs until `stop`
    /// signals.
    pub async fn watch_changes(&self, mut stop: watch::Receiver<bool>) -> Result<(), StoreError> {
        let (tx, mut rx) = mpsc::channel::<Result<notify::Event, notify::Error>>(32);
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = tx.blocking_send(event);
        })?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        debug!(file = %self.path.display(), "watching registry file");

        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            let debounce = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = stop.changed() => break,
                _ = debounce => {
                    deadline = None;
                    self.reload();
                }
                event = rx.recv() => match event {
                    Some(Ok(event)) => {
                        if matches!(
                            event.kind,
                            notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                        ) {
                            deadline = Some(tokio::time::Instant::now() + RELOAD_DEBOUNCE);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "registry watcher error"),
                    None => {
                        debug!("registry watcher event stream closed");
                        break;
                    }
                },
            }
        }

        debug!(file = %self.path.display(), "stopped watching registry file");
        Ok(())
    }
}

impl Registry for YamlStore {
    fn vlans(&self) -> Result<Vec<Vlan>, RegistryError> {
        Ok(self.lock().vlans())
    }

    fn vlan(&self, id: &str) -> Result<Vlan, RegistryError> {
        self.lock().vlan(id)
    }

    fn create_vlan(&self, vlan: Vlan) -> Result<(), RegistryError> {
        self.mutate(|r| r.create_vlan(vlan))
    }

    fn update_vlan(&self, vlan: Vlan) -> Result<(), RegistryError> {
        self.mutate(|r| r.update_vlan(vlan))
    }

    fn delete_vlan(&self, id: &str) -> Result<(), RegistryError> {
        self.mutate(|r| r.delete_vlan(id))
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
        self.mutate(|r| r.create_device(device))
    }

    fn update_device(&self, device: Device) -> Result<(), RegistryError> {
        self.mutate(|r| r.update_device(device))
    }

    fn delete_device(&self, username: &str) -> Result<(), RegistryError> {
        self.mutate(|r| r.delete_device(username))
    }

    fn blocked(&self) -> Result<Vec<BlockedDevice>, RegistryError> {
        Ok(self.lock().blocked())
    }

    fn is_blocked(&self, username: &str) -> Result<bool, RegistryError> {
        Ok(self.lock().is_blocked(username))
    }

    fn block(&self, username: &str) -> Result<(), RegistryError> {
        self.mutate(|r| r.block(username))
    }

    fn unblock(&self, username: &str) -> Result<(), RegistryError> {
        self.mutate(|r| r.unblock(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
users:
  - username: aa:bb:cc:11:22:33
    password: aa:bb:cc:11:22:33
    vlan: \"20\"
    description: printer
vlans:
  - id: \"1\"
    name: Default
    default: true
  - id: \"20\"
    name: IOT
blocked:
  - username: ee:ff:00:11:22:33
";

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("registry.yaml");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn rejects_relative_path() {
        assert!(matches!(
            YamlStore::open("registry.yaml"),
            Err(StoreError::RelativePath(_))
        ));
    }

    #[test]
    fn loads_all_sections() {
        let dir = tempdir().unwrap();
        let store = YamlStore::open(write_sample(&dir)).unwrap();

        assert_eq!(store.vlans().unwrap().len(), 2);
        assert_eq!(store.default_vlan().unwrap().id, "1");
        assert_eq!(store.device("aa:bb:cc:11:22:33").unwrap().description, "printer");
        assert!(store.is_blocked("ee:ff:00:11:22:33").unwrap());
    }

    #[test]
    fn load_rejects_dangling_device_reference() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        fs::write(
            &path,
            "users:\n  - username: a\n    password: a\n    vlan: \"9\"\nvlans: []\nblocked: []\n",
        )
        .unwrap();

        assert!(matches!(
            YamlStore::open(path),
            Err(StoreError::Registry(RegistryError::InvalidVlanReference { .. }))
        ));
    }

    #[test]
    fn dump_load_round_trip_preserves_state() {
        let dir = tempdir().unwrap();
        let store = YamlStore::open(write_sample(&dir)).unwrap();

        store
            .create_device(Device {
                username: "11:22:33:44:55:66".to_string(),
                password: "11:22:33:44:55:66".to_string(),
                vlan_id: "20".to_string(),
                description: String::new(),
            })
            .unwrap();

        let reopened = YamlStore::open(store.path()).unwrap();
        assert_eq!(reopened.devices().unwrap(), store.devices().unwrap());
        assert_eq!(reopened.vlans().unwrap(), store.vlans().unwrap());
        assert_eq!(reopened.blocked().unwrap(), store.blocked().unwrap());
    }

    #[test]
    fn dump_omits_defaulted_fields() {
        let dir = tempdir().unwrap();
        let store = YamlStore::open(write_sample(&dir)).unwrap();
        store.save().unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(!contents.contains("tunnelType"));
        assert!(!contents.contains("default: false"));
        assert!(contents.contains("default: true"));
    }

    #[test]
    fn mutation_is_durable_before_returning() {
        let dir = tempdir().unwrap();
        let store = YamlStore::open(write_sample(&dir)).unwrap();

        store.block("aa:bb:cc:11:22:33").unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(contents.contains("aa:bb:cc:11:22:33"));
        let parsed: RegistryFile = serde_yaml::from_str(&contents).unwrap();
        assert_eq!(parsed.blocked.len(), 2);
    }

    #[tokio::test]
    async fn watcher_debounces_external_edits() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(YamlStore::open(write_sample(&dir)).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);

        let watcher = {
            let store = store.clone();
            tokio::spawn(async move { store.watch_changes(stop_rx).await })
        };

        // Give the watcher time to register before editing.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let edited = SAMPLE.replace("name: IOT", "name: Things");
        for _ in 0..3 {
            fs::write(store.path(), &edited).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(store.vlan("20").unwrap().name, "Things");
        assert_eq!(store.reload_count(), 1);

        stop_tx.send(true).unwrap();
        watcher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn broken_reload_keeps_previous_state() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(YamlStore::open(write_sample(&dir)).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);

        let watcher = {
            let store = store.clone();
            tokio::spawn(async move { store.watch_changes(stop_rx).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(store.path(), "users: [ not yaml").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(store.vlan("20").unwrap().name, "IOT");

        stop_tx.send(true).unwrap();
        watcher.await.unwrap().unwrap();
    }
}
