//! Name-keyed executer registry.
//!
//! Lookups happen for every dispatched command while registration happens
//! at setup, so the map sits behind an [`RwLock`]. Poisoning is surfaced on
//! mutation and treated as "not found" by lookups.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, warn};

use crate::executer::{Executer, ExecutionLink};

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

type ExecuterMap = HashMap<String, Arc<dyn Executer>>;

fn registry_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Errors raised while mutating the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An executer is already registered under this name.
    #[error("an executer for '{name}' is already registered")]
    Duplicate {
        /// Conflicting command name.
        name: String,
    },
    /// A thread panicked while holding the registry lock.
    #[error("executer registry lock poisoned")]
    Poisoned,
}

/// Executers registered with one manager, keyed by command name.
pub struct ExecuterRegistry {
    executers: RwLock<ExecuterMap>,
    link: ExecutionLink,
}

impl ExecuterRegistry {
    /// Creates an empty registry that attaches executers with `link`.
    #[must_use]
    pub fn new(link: ExecutionLink) -> Self {
        Self {
            executers: RwLock::new(HashMap::new()),
            link,
        }
    }

    fn read(&self) -> Option<RwLockReadGuard<'_, ExecuterMap>> {
        self.executers.read().ok()
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ExecuterMap>, RegistryError> {
        self.executers.write().map_err(|_| RegistryError::Poisoned)
    }

    /// Registers `executer` under its command name and attaches it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] without touching the registry or
    /// the executer when the name is taken.
    pub fn add(&self, executer: Arc<dyn Executer>) -> Result<(), RegistryError> {
        let name = executer.command_name().to_owned();
        let mut executers = self.write()?;
        if executers.contains_key(&name) {
            warn!(
                target: REGISTRY_TARGET,
                command = %name,
                "rejected duplicate executer registration"
            );
            return Err(RegistryError::Duplicate { name });
        }
        executer.attach(self.link.clone());
        executers.insert(name.clone(), executer);
        debug!(target: REGISTRY_TARGET, command = %name, "executer registered");
        Ok(())
    }

    /// Unregisters and detaches the executer for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if the lock is poisoned.
    pub fn remove(&self, name: &str) -> Result<Option<Arc<dyn Executer>>, RegistryError> {
        let removed = self.write()?.remove(&registry_key(name));
        if let Some(executer) = &removed {
            executer.detach();
            debug!(
                target: REGISTRY_TARGET,
                command = executer.command_name(),
                "executer removed"
            );
        }
        Ok(removed)
    }

    /// Unregisters and detaches every executer, returning how many were held.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if the lock is poisoned.
    pub fn clear(&self) -> Result<usize, RegistryError> {
        let drained: Vec<_> = self.write()?.drain().map(|(_, executer)| executer).collect();
        for executer in &drained {
            executer.detach();
        }
        Ok(drained.len())
    }

    /// Executer registered for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Executer>> {
        self.read()?.get(&registry_key(name)).cloned()
    }

    /// Whether an executer is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let key = registry_key(name);
        self.read()
            .is_some_and(|executers| executers.contains_key(&key))
    }

    /// Number of registered executers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map_or(0, |executers| executers.len())
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every executer, ordered by command name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Executer>> {
        let mut executers: Vec<_> = self
            .read()
            .map(|executers| executers.values().cloned().collect())
            .unwrap_or_default();
        executers.sort_by(|a, b| a.command_name().cmp(b.command_name()));
        executers
    }
}

impl std::fmt::Debug for ExecuterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|executer| executer.command_name().to_owned())
            .collect();
        f.debug_struct("ExecuterRegistry")
            .field("executers", &names)
            .finish_non_exhaustive()
    }
}
