//! Shared test utilities for integration tests.
//!
//! This module provides common helpers used across integration tests, particularly
//! for environment variable manipulation which requires careful synchronization.

use std::sync::{Mutex, MutexGuard};

use valdeploy::config::env_var_names;

/// Global mutex protecting environment variable access.
///
/// All tests that read or modify environment variables must acquire this lock
/// to prevent data races. `#[serial]` already prevents concurrent execution;
/// the guard makes the synchronisation visible in test code.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard for exclusive environment variable access.
pub struct EnvGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl EnvGuard<'_> {
    /// Acquire exclusive access to the environment.
    ///
    /// A poisoned mutex is still acquired so later tests can run.
    #[must_use]
    pub fn lock() -> EnvGuard<'static> {
        let guard = ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        EnvGuard { _guard: guard }
    }
}

/// Clears all `VALDEPLOY_*` environment variables and returns a guard.
///
/// Uses [`env_var_names()`] from the loader to stay in sync with the actual
/// environment variable mappings. Also clears `VALDEPLOY_CONFIG_PATH`, which
/// is handled by config discovery instead of the table.
///
/// # Safety
///
/// `std::env::remove_var` is unsafe in Rust 2024 edition. The mutex guard
/// guarantees exclusive access to environment variables.
#[must_use]
pub fn clear_valdeploy_env() -> EnvGuard<'static> {
    let guard = EnvGuard::lock();

    // SAFETY: Mutex guard ensures exclusive access to environment variables.
    unsafe {
        std::env::remove_var("VALDEPLOY_CONFIG_PATH");
    }

    for var in env_var_names() {
        // SAFETY: Mutex guard ensures exclusive access to environment variables.
        unsafe {
            std::env::remove_var(var);
        }
    }

    guard
}

/// Sets an environment variable while the caller holds an [`EnvGuard`].
///
/// # Safety
///
/// `std::env::set_var` is unsafe in Rust 2024 edition. Callers hold the guard
/// returned by [`clear_valdeploy_env`], so access is exclusive.
pub fn set_env_var(_guard: &EnvGuard<'_>, key: &str, value: &str) {
    // SAFETY: The guard argument proves exclusive access to the environment.
    unsafe {
        std::env::set_var(key, value);
    }
}
