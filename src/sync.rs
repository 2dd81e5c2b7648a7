// SPDX-License-Identifier: GPL-3.0-only

//! Lock helpers
//!
//! A panicking sample handler must not poison device or sink state for the
//! rest of the process, so poisoned locks are recovered rather than unwrapped.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
