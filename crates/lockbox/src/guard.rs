//! Protected mode: a switch that disables decryption and blocks re-encryption.
//!
//! While protected, reads of encrypted attributes return the stored ciphertext
//! verbatim, bulk projections substitute ciphertext columns, guarded
//! [`CipherBox`](crate::crypto::CipherBox)es echo their input, and any commit
//! carrying a new plaintext for an encrypted attribute is rejected.
//!
//! A [`ProtectedMode`] handle is a cheap clone over one shared flag. The
//! process-wide handle behind [`ProtectedMode::global`] is what the free
//! functions toggle; contexts may instead hold their own handle.
//!
//! Toggling is a control-plane action. Flipping the flag while other threads
//! are mid-commit is not serialised against them; callers that need that must
//! order toggles externally.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use tracing::info;

/// Observable guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    /// Normal operation: transparent encrypt/decrypt.
    Unprotected,
    /// Decryption disabled, encrypted writes rejected.
    Protected,
}

/// Shared, cloneable protected-mode flag. Starts [`ProtectionState::Unprotected`].
#[derive(Clone, Debug, Default)]
pub struct ProtectedMode {
    flag: Arc<AtomicBool>,
}

impl ProtectedMode {
    /// Create an independent handle, initially unprotected.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide handle.
    pub fn global() -> &'static ProtectedMode {
        static GLOBAL: OnceLock<ProtectedMode> = OnceLock::new();
        GLOBAL.get_or_init(ProtectedMode::new)
    }

    /// Returns `true` while protected.
    pub fn is_enabled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Current state.
    pub fn state(&self) -> ProtectionState {
        if self.is_enabled() {
            ProtectionState::Protected
        } else {
            ProtectionState::Unprotected
        }
    }

    /// Enter protected mode. No-op if already protected.
    pub fn enable(&self) {
        self.set(true);
    }

    /// Leave protected mode. No-op if already unprotected.
    pub fn disable(&self) {
        self.set(false);
    }

    /// Set the flag and return the previous value.
    pub fn set(&self, enabled: bool) -> bool {
        let previous = self.flag.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(protected = enabled, "protected mode changed");
        }
        previous
    }

    /// Enable protection until the returned guard is dropped, then restore
    /// whatever state was in effect before.
    pub fn scope(&self) -> ProtectedModeScope {
        let previous = self.set(true);
        ProtectedModeScope {
            mode: self.clone(),
            previous,
        }
    }

    /// Run `f` with protection enabled, restoring the prior state afterwards
    /// (including on panic).
    pub fn with_enabled<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = self.scope();
        f()
    }
}

/// RAII guard returned by [`ProtectedMode::scope`].
#[derive(Debug)]
#[must_use = "protection is lifted as soon as the scope is dropped"]
pub struct ProtectedModeScope {
    mode: ProtectedMode,
    previous: bool,
}

impl Drop for ProtectedModeScope {
    fn drop(&mut self) {
        self.mode.set(self.previous);
    }
}

/// Enable the process-wide protected mode.
pub fn enable_protected_mode() {
    ProtectedMode::global().enable();
}

/// Disable the process-wide protected mode.
pub fn disable_protected_mode() {
    ProtectedMode::global().disable();
}

/// Returns `true` while the process-wide protected mode is enabled.
pub fn protected_mode_enabled() -> bool {
    ProtectedMode::global().is_enabled()
}

/// Run `f` with the process-wide protected mode enabled.
pub fn with_protected_mode<T>(f: impl FnOnce() -> T) -> T {
    ProtectedMode::global().with_enabled(f)
}
