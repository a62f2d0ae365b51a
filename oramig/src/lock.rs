//! Cross-process advisory locking.
//!
//! The lock serializes schema changes between independent orchestrator processes, possibly on
//! different hosts. All state that matters lives on the server; [AdvisoryLock] only mirrors
//! whether this instance currently holds it.

use crate::connection::{LockHandle, LockPrimitive};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LockState {
    Unallocated,
    Allocated(LockHandle),
    Held(LockHandle),
}

/// A named advisory lock owned by one driver instance.
///
/// The handle is allocated on the first [lock](AdvisoryLock::lock) and reused until the
/// instance is dropped. It is never shared with another instance.
#[derive(Debug)]
pub struct AdvisoryLock {
    name: String,
    state: LockState,
}

impl AdvisoryLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: LockState::Unallocated,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Held(_))
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        match &self.state {
            LockState::Unallocated => None,
            LockState::Allocated(handle) | LockState::Held(handle) => Some(handle),
        }
    }

    /// Acquire the lock. Fails immediately with [Error::Locked] if this instance already holds
    /// it, and with [Error::LockRequest] if the server refuses (e.g. another session holds it).
    pub fn lock<P>(&mut self, primitive: &mut P) -> Result<(), Error>
    where
        P: LockPrimitive + ?Sized,
    {
        let handle = match &self.state {
            LockState::Held(_) => return Err(Error::Locked),
            LockState::Allocated(handle) => handle.clone(),
            LockState::Unallocated => {
                let handle = primitive.allocate(&self.name)?;
                #[cfg(feature = "tracing")]
                tracing::debug!(lock_name = %self.name, handle = %handle, "Allocated lock handle");
                self.state = LockState::Allocated(handle.clone());
                handle
            }
        };

        match primitive.request(&handle)? {
            0 => {
                #[cfg(feature = "tracing")]
                tracing::debug!(lock_name = %self.name, "Acquired advisory lock");
                self.state = LockState::Held(handle);
                Ok(())
            }
            code => Err(Error::LockRequest {
                handle: handle.to_string(),
                code,
            }),
        }
    }

    /// Release the lock. A no-op when it is not held. On a non-zero result the lock is still
    /// considered held.
    pub fn unlock<P>(&mut self, primitive: &mut P) -> Result<(), Error>
    where
        P: LockPrimitive + ?Sized,
    {
        let LockState::Held(handle) = &self.state else {
            return Ok(());
        };
        let handle = handle.clone();

        match primitive.release(&handle)? {
            0 => {
                #[cfg(feature = "tracing")]
                tracing::debug!(lock_name = %self.name, "Released advisory lock");
                self.state = LockState::Allocated(handle);
                Ok(())
            }
            code => Err(Error::Unlock {
                handle: handle.to_string(),
                code,
            }),
        }
    }
}
