//! Bounded acquisition for per-entity locks
//!
//! Zone and territory state each sit behind their own mutex so writers to
//! different entities never serialize. Acquisition is bounded: contention
//! past the configured budget surfaces as a transient `Conflict` error
//! rather than blocking the caller indefinitely.

use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::core::error::{EngineError, Result};

/// Acquire `lock`, yielding between attempts, for at most `attempts` tries.
///
/// A poisoned lock also reports as a conflict: the entity's state is
/// suspect and the caller should retry against a recovered copy.
pub fn lock_with_retry<'a, T>(
    lock: &'a Mutex<T>,
    attempts: u32,
    entity: &str,
) -> Result<MutexGuard<'a, T>> {
    for _ in 0..attempts.max(1) {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::WouldBlock) => std::thread::yield_now(),
            Err(TryLockError::Poisoned(_)) => {
                return Err(EngineError::Conflict {
                    entity: entity.to_string(),
                })
            }
        }
    }
    Err(EngineError::Conflict {
        entity: entity.to_string(),
    })
}
