//! Session store owned by the delivery task.
//!
//! Holds the remote-compiler-list cache and the match cache, keyed by the
//! `SourceSettings` *value* (its equality contract), never by identity.
//! Workers never touch this store; they hand results to the delivery task,
//! which applies them here.

use std::collections::HashMap;

use tracing::debug;

use correlation::{match_compilers, CompilerMatches, RemoteCompilerInfo, SourceSettings};

#[derive(Debug, Default)]
pub struct SessionStore {
    connected: bool,
    remote_compilers: Vec<RemoteCompilerInfo>,
    matches: HashMap<SourceSettings, CompilerMatches>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn remote_compilers(&self) -> &[RemoteCompilerInfo] {
        &self.remote_compilers
    }

    /// Apply a freshly fetched compiler list. Invalidates every cached match,
    /// since they were computed against the old list.
    pub fn set_remote_compilers(&mut self, list: Vec<RemoteCompilerInfo>) {
        debug!(count = list.len(), "remote compiler list cached");
        self.remote_compilers = list;
        self.matches.clear();
        self.connected = true;
    }

    /// Drop the connected status but keep the stale list, per the
    /// connection-error contract.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Forget everything learned from the remote service.
    pub fn clear_connection(&mut self) {
        self.connected = false;
        self.remote_compilers.clear();
        self.matches.clear();
    }

    /// Match `settings` against the cached list, memoized by settings value.
    pub fn matches_for(
        &mut self,
        settings: &SourceSettings,
        allow_minor_version_mismatch: bool,
    ) -> CompilerMatches {
        if let Some(cached) = self.matches.get(settings) {
            return cached.clone();
        }
        let matches = match_compilers(
            settings,
            &self.remote_compilers,
            allow_minor_version_mismatch,
        );
        self.matches.insert(settings.clone(), matches.clone());
        matches
    }

    /// Replace the chosen match for `settings` with the alternative carrying
    /// `compiler_id`. Returns the updated matches, or `None` when the id is
    /// unknown or nothing was cached.
    pub fn override_chosen(
        &mut self,
        settings: &SourceSettings,
        compiler_id: &str,
    ) -> Option<CompilerMatches> {
        let overridden = self.matches.get(settings)?.with_chosen_id(compiler_id)?;
        self.matches.insert(settings.clone(), overridden.clone());
        Some(overridden)
    }
}
