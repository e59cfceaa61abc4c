//! Advisory lock/lease machinery for remote (network) storage backends (§5).
//!
//! [`LocalStorage`](crate::local::LocalStorage) locks are instantaneous —
//! there's no lease to renew, since the holder and the filesystem share a
//! clock. A networked backend can't make that assumption: a client might
//! hold a lock across many round trips while doing a merge, and the server
//! needs to reclaim locks whose holder has vanished (crashed, lost its
//! connection) without waiting forever.
//!
//! The contract split mirrors that asymmetry:
//!
//! - Server side: [`LeaseLockService`] holds one lease per named lock
//!   behind a single mutex. A lease has a deadline; [`LeaseLockService::sweep_expired`]
//!   reclaims anything past its deadline and is meant to be driven by a
//!   timer on whatever interval the backend chooses.
//! - Client side: [`LeaseLatch`] is a sticky failure cell. The client
//!   refreshes its lease periodically in the background; the moment a
//!   refresh fails, the latch poisons and every subsequent call on that
//!   lock fails fast instead of racing a lock it may no longer hold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock {name} is already held")]
    AlreadyHeld { name: String },
    #[error("lock token is unknown or already released")]
    UnknownToken,
    #[error("lock token does not match the current holder")]
    TokenMismatch,
}

struct LeaseState {
    token: String,
    deadline: Instant,
}

/// Server-side registry of named leases.
pub struct LeaseLockService {
    leases: Mutex<HashMap<String, LeaseState>>,
}

impl Default for LeaseLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseLockService {
    #[must_use]
    pub fn new() -> Self {
        Self { leases: Mutex::new(HashMap::new()) }
    }

    /// Acquire `name` for `lease`, returning an opaque token the holder
    /// must present to refresh or release it.
    ///
    /// # Errors
    /// Returns [`LockError::AlreadyHeld`] if an unexpired lease already
    /// exists for this name.
    pub fn acquire(&self, name: &str, lease: Duration) -> Result<String, LockError> {
        self.acquire_at(name, lease, Instant::now())
    }

    fn acquire_at(&self, name: &str, lease: Duration, now: Instant) -> Result<String, LockError> {
        let mut leases = self.leases.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = leases.get(name) {
            if existing.deadline > now {
                return Err(LockError::AlreadyHeld { name: name.to_string() });
            }
        }
        let mut token_bytes = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut token_bytes);
        let token: String = token_bytes.iter().map(|b| format!("{b:02x}")).collect();
        leases.insert(name.to_string(), LeaseState { token: token.clone(), deadline: now + lease });
        Ok(token)
    }

    /// Extend an existing lease's deadline.
    ///
    /// # Errors
    /// [`LockError::UnknownToken`] if the named lock has no active lease
    /// (expired or never acquired); [`LockError::TokenMismatch`] if
    /// `token` doesn't match the current holder.
    pub fn refresh(&self, name: &str, token: &str, lease: Duration) -> Result<(), LockError> {
        self.refresh_at(name, token, lease, Instant::now())
    }

    fn refresh_at(&self, name: &str, token: &str, lease: Duration, now: Instant) -> Result<(), LockError> {
        let mut leases = self.leases.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match leases.get_mut(name) {
            Some(state) if state.deadline > now && state.token == token => {
                state.deadline = now + lease;
                Ok(())
            }
            Some(state) if state.token == token => Err(LockError::UnknownToken), // expired
            Some(_) => Err(LockError::TokenMismatch),
            None => Err(LockError::UnknownToken),
        }
    }

    /// Release a lease early.
    ///
    /// # Errors
    /// Same conditions as [`LeaseLockService::refresh`].
    pub fn release(&self, name: &str, token: &str) -> Result<(), LockError> {
        let mut leases = self.leases.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match leases.get(name) {
            Some(state) if state.token == token => {
                leases.remove(name);
                Ok(())
            }
            Some(_) => Err(LockError::TokenMismatch),
            None => Err(LockError::UnknownToken),
        }
    }

    /// Drop every lease whose deadline has passed. Call this on a timer;
    /// the service never spawns its own thread.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let mut leases = self.leases.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        leases.retain(|_, state| state.deadline > now);
    }

    #[must_use]
    pub fn is_held(&self, name: &str) -> bool {
        let now = Instant::now();
        let leases = self.leases.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        leases.get(name).is_some_and(|state| state.deadline > now)
    }
}

/// Client-side sticky failure cell for a held lease.
///
/// A background refresher calls [`LeaseLatch::poison`] the first time a
/// refresh fails; every caller checking [`LeaseLatch::is_poisoned`]
/// afterwards sees the failure, even if it happened between their calls.
#[derive(Default)]
pub struct LeaseLatch {
    poisoned: AtomicBool,
}

impl LeaseLatch {
    #[must_use]
    pub fn new() -> Self {
        Self { poisoned: AtomicBool::new(false) }
    }

    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }
}
