// crates/grade-gate-core/src/runtime/gate.rs
// ============================================================================
// Module: Grade Gate Concurrency Gate
// Description: Counting admission gate bounding concurrent tester runs.
// Purpose: Cap the expensive tester phase while leaving fan-out unbounded.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`ConcurrencyGate`] wraps a tokio semaphore. [`ConcurrencyGate::acquire`]
//! suspends only the awaiting task until a unit is free and returns a
//! [`GatePermit`]; dropping the permit returns the unit on every exit path.
//! The gate is consulted right before the tester call, so page loads and
//! policy checks are never throttled.
//!
//! A batch swap builds a [`ConcurrencyGate::successor`] with the new capacity.
//! Successors share slot accounting with their predecessor: permits still
//! held by testers of a replaced batch count against the new capacity, and
//! when the capacity shrinks the excess held permits are retired as they are
//! released instead of being returned.
//!
//! Ceilings are read through [`ConcurrencyCeiling`]: [`FixedCeiling`] for a
//! value loaded once at startup, [`SharedCeiling`] when the host adjusts it
//! between batches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

use crate::interfaces::ConcurrencyCeiling;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Concurrency gate errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Capacity outside `1..=Semaphore::MAX_PERMITS`.
    #[error("invalid gate capacity: {0}")]
    InvalidCapacity(usize),
    /// The gate was closed while waiting.
    #[error("concurrency gate closed")]
    Closed,
}

// ============================================================================
// SECTION: Slot Accounting
// ============================================================================

/// Slot accounting shared by a gate and all of its successors.
///
/// # Invariants
/// - `available + held == ledger.capacity + ledger.debt`.
/// - Releases and capacity changes happen under the ledger lock.
#[derive(Debug)]
struct GateSlots {
    /// Free units.
    semaphore: Arc<Semaphore>,
    /// Current capacity and outstanding retirements.
    ledger: Mutex<SlotLedger>,
}

/// Capacity bookkeeping for [`GateSlots`].
#[derive(Debug)]
struct SlotLedger {
    /// Capacity of the newest gate.
    capacity: usize,
    /// Held permits to retire on release after a shrink.
    debt: usize,
}

impl GateSlots {
    /// Locks the ledger; the ledger holds plain counters, so a poisoned lock is still usable.
    fn ledger(&self) -> MutexGuard<'_, SlotLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rejects capacities the semaphore cannot represent.
const fn validate_capacity(capacity: usize) -> Result<(), GateError> {
    if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
        return Err(GateError::InvalidCapacity(capacity));
    }
    Ok(())
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Counting admission gate with a fixed capacity.
///
/// # Invariants
/// - At most `capacity` permits of this gate's lineage are outstanding once
///   permits held under a larger predecessor have been released.
#[derive(Debug)]
pub struct ConcurrencyGate {
    /// Slot accounting shared with predecessors and successors.
    slots: Arc<GateSlots>,
    /// Capacity this gate was built with.
    capacity: usize,
}

impl ConcurrencyGate {
    /// Creates a gate admitting `capacity` concurrent holders.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidCapacity`] when `capacity` is zero or too large.
    pub fn new(capacity: usize) -> Result<Self, GateError> {
        validate_capacity(capacity)?;
        Ok(Self {
            slots: Arc::new(GateSlots {
                semaphore: Arc::new(Semaphore::new(capacity)),
                ledger: Mutex::new(SlotLedger {
                    capacity,
                    debt: 0,
                }),
            }),
            capacity,
        })
    }

    /// Builds a gate with a new capacity that inherits this gate's held permits.
    ///
    /// Growing adds free units at once. Shrinking removes free units and
    /// retires the remainder as held permits are released.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidCapacity`] when `capacity` is zero or too
    /// large; the existing gate is left unchanged.
    pub fn successor(&self, capacity: usize) -> Result<Self, GateError> {
        validate_capacity(capacity)?;
        let mut ledger = self.slots.ledger();
        if capacity >= ledger.capacity {
            let growth = capacity - ledger.capacity;
            let repaid = growth.min(ledger.debt);
            ledger.debt -= repaid;
            self.slots.semaphore.add_permits(growth - repaid);
        } else {
            let shrink = ledger.capacity - capacity;
            let retired = self.slots.semaphore.forget_permits(shrink);
            ledger.debt += shrink - retired;
        }
        ledger.capacity = capacity;
        drop(ledger);
        Ok(Self {
            slots: Arc::clone(&self.slots),
            capacity,
        })
    }

    /// Waits for a free unit and returns a permit holding it.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Closed`] when the gate has been closed.
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        let permit = Arc::clone(&self.slots.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)?;
        Ok(GatePermit {
            permit: Some(permit),
            slots: Arc::clone(&self.slots),
        })
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of units held across this gate's lineage.
    #[must_use]
    pub fn in_use(&self) -> usize {
        let ledger = self.slots.ledger();
        (ledger.capacity + ledger.debt).saturating_sub(self.slots.semaphore.available_permits())
    }
}

/// One held unit of a [`ConcurrencyGate`]; released or retired on drop.
#[derive(Debug)]
pub struct GatePermit {
    /// Underlying semaphore permit; taken on drop.
    permit: Option<OwnedSemaphorePermit>,
    /// Accounting that decides whether the unit is returned.
    slots: Arc<GateSlots>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let mut ledger = self.slots.ledger();
        if ledger.debt > 0 {
            ledger.debt -= 1;
            permit.forget();
        } else {
            drop(permit);
        }
    }
}

// ============================================================================
// SECTION: Ceilings
// ============================================================================

/// Ceiling fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCeiling(pub usize);

impl ConcurrencyCeiling for FixedCeiling {
    fn max_concurrent(&self) -> usize {
        self.0
    }
}

/// Ceiling shared with the host and adjustable between batches.
///
/// # Invariants
/// - Updates only affect gates built after the update.
#[derive(Debug, Clone)]
pub struct SharedCeiling {
    /// Current ceiling.
    value: Arc<AtomicUsize>,
}

impl SharedCeiling {
    /// Creates a shared ceiling with an initial value.
    #[must_use]
    pub fn new(value: usize) -> Self {
        Self {
            value: Arc::new(AtomicUsize::new(value)),
        }
    }

    /// Replaces the ceiling used by subsequent batches.
    pub fn set(&self, value: usize) {
        self.value.store(value, Ordering::SeqCst);
    }
}

impl ConcurrencyCeiling for SharedCeiling {
    fn max_concurrent(&self) -> usize {
        self.value.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
