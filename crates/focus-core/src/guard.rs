//! Single-active-session lock.
//!
//! The host shares one [`ActiveSessionGuard`] between the engine and its
//! navigation code. While a [`SessionToken`] is outstanding the host must not
//! switch the open note away from the session's target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::FocusError;

/// Hands out at most one [`SessionToken`] at a time.
#[derive(Debug, Clone, Default)]
pub struct ActiveSessionGuard {
    inner: Arc<GuardInner>,
}

#[derive(Debug, Default)]
struct GuardInner {
    holder: Mutex<Option<u64>>,
    next_id: AtomicU64,
}

/// Proof that the caller owns the active-session slot.
///
/// Dropping the token releases the slot.
#[derive(Debug)]
#[must_use = "dropping the token releases the active-session lock"]
pub struct SessionToken {
    id: u64,
    inner: Arc<GuardInner>,
}

impl ActiveSessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot, or fail with `FocusError::AlreadyActive`.
    pub fn try_acquire(&self) -> Result<SessionToken, FocusError> {
        let mut holder = self.inner.lock();
        if holder.is_some() {
            return Err(FocusError::AlreadyActive);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        *holder = Some(id);
        debug!(token = id, "acquired active session lock");

        Ok(SessionToken {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Give the slot back.
    pub fn release(&self, token: SessionToken) {
        drop(token);
    }

    /// Returns whether a session currently holds the slot.
    pub fn is_locked(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Returns whether the host may switch to another note.
    pub fn allows_navigation(&self) -> bool {
        !self.is_locked()
    }
}

impl SessionToken {
    /// Returns whether this token still owns the slot.
    pub fn is_valid(&self) -> bool {
        *self.inner.lock() == Some(self.id)
    }
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        let mut holder = self.inner.lock();
        if *holder == Some(self.id) {
            *holder = None;
            debug!(token = self.id, "released active session lock");
        } else {
            warn!(token = self.id, "released a token that no longer owns the lock");
        }
    }
}

impl GuardInner {
    fn lock(&self) -> MutexGuard<'_, Option<u64>> {
        // The guarded value is a plain id, so a poisoned lock is still usable.
        self.holder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_allow_only_one_token() {
        let guard = ActiveSessionGuard::new();
        let token = guard.try_acquire().expect("should acquire");

        assert!(matches!(guard.try_acquire(), Err(FocusError::AlreadyActive)));
        assert!(guard.is_locked());
        assert!(!guard.allows_navigation());
        assert!(token.is_valid());

        guard.release(token);
        assert!(!guard.is_locked());
        assert!(guard.allows_navigation());
    }

    #[test]
    fn test_should_release_on_drop() {
        let guard = ActiveSessionGuard::new();
        {
            let _token = guard.try_acquire().expect("should acquire");
            assert!(guard.is_locked());
        }
        assert!(!guard.is_locked());
        let _again = guard.try_acquire().expect("should reacquire after drop");
    }

    #[test]
    fn test_should_share_lock_between_clones() {
        let guard = ActiveSessionGuard::new();
        let host_view = guard.clone();

        let token = guard.try_acquire().expect("should acquire");
        assert!(host_view.is_locked());
        assert!(host_view.try_acquire().is_err());
        drop(token);
        assert!(host_view.try_acquire().is_ok());
    }

    #[test]
    fn test_should_issue_fresh_token_ids() {
        let guard = ActiveSessionGuard::new();
        let first = guard.try_acquire().unwrap();
        let first_id = first.id;
        drop(first);
        let second = guard.try_acquire().unwrap();
        assert_ne!(first_id, second.id);
    }
}
