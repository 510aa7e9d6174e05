//! Per-domain compile cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{GateError, GateResult};
use crate::manifest::DomainManifest;

use super::CompiledManifest;

/// Compiled manifests keyed by domain id.
///
/// An entry is served only while the manifest fingerprint and the
/// verification flag it was built with still match; a changed manifest
/// misses and replaces it.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: RwLock<HashMap<String, Arc<CompiledManifest>>>,
}

impl CompileCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a fresh entry for `manifest`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn get(&self, manifest: &DomainManifest, verify: bool) -> GateResult<Option<Arc<CompiledManifest>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| GateError::internal("compile cache lock poisoned"))?;
        Ok(entries
            .get(manifest.domain_id())
            .filter(|c| c.fingerprint() == manifest.fingerprint() && c.is_verified() == verify)
            .cloned())
    }

    /// Stores `compiled` under its domain id, replacing any older entry.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn insert(&self, compiled: Arc<CompiledManifest>) -> GateResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| GateError::internal("compile cache lock poisoned"))?;
        entries.insert(compiled.domain_id().to_string(), compiled);
        Ok(())
    }

    /// Drops the entry for `domain_id`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn invalidate(&self, domain_id: &str) -> GateResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| GateError::internal("compile cache lock poisoned"))?;
        Ok(entries.remove(domain_id).is_some())
    }

    /// Number of cached domains.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn len(&self) -> GateResult<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| GateError::internal("compile cache lock poisoned"))?;
        Ok(entries.len())
    }
}
