use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

/// A producer paired with the result of its first evaluation.
///
/// The producer runs at most once, on the first call to [`Memo::get`], even
/// when several threads call `get` at the same time. The producer is assumed
/// to be idempotent and free of side effects beyond its return value.
pub struct Memo<T, F = fn() -> T> {
    producer: F,
    value: OnceLock<T>,
}

impl<T, F> Memo<T, F>
where
    F: Fn() -> T,
{
    pub fn new(producer: F) -> Self {
        Self {
            producer,
            value: OnceLock::new(),
        }
    }

    /// The memoized result, computing it on first use.
    pub fn get(&self) -> &T {
        self.value.get_or_init(|| (self.producer)())
    }

    /// Whether the producer has already run.
    pub fn is_computed(&self) -> bool {
        self.value.get().is_some()
    }

    /// Consume the memo, returning the result if it was computed.
    pub fn into_inner(self) -> Option<T> {
        self.value.into_inner()
    }
}

impl<T: fmt::Debug, F> fmt::Debug for Memo<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo").field("value", &self.value.get()).finish()
    }
}

type Slot = Arc<Mutex<Option<Arc<dyn Any + Send + Sync>>>>;

/// Per-owner table of memoized operation results.
///
/// An owner embeds a `Memoizer` and routes each expensive, argument-free
/// operation through it under a stable name. The first call for a name runs
/// the operation and records its result; every later call on the same
/// `Memoizer` returns the recorded result. Results live as long as the
/// `Memoizer` (and so its owner).
///
/// Slots are keyed by operation name and result type. Concurrent callers for
/// one slot wait for the first to finish. A failed computation records
/// nothing, so the next call tries again. Calling back into the same slot
/// from inside its own computation deadlocks.
#[derive(Default)]
pub struct Memoizer {
    slots: Mutex<HashMap<(&'static str, TypeId), Slot>>,
}

impl Memoizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the recorded result of `operation`, running `compute` if this
    /// is the first call.
    pub fn get_or_compute<T, F>(&self, operation: &'static str, compute: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        match self.get_or_try_compute::<T, std::convert::Infallible, _>(operation, || Ok(compute()))
        {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`Memoizer::get_or_compute`]. Errors are returned
    /// to the caller and not recorded.
    pub fn get_or_try_compute<T, E, F>(&self, operation: &'static str, compute: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let slot = self.slot::<T>(operation);
        let mut recorded = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(value) = recorded.as_ref().and_then(|v| v.downcast_ref::<T>()) {
            debug!(operation, "memoized result reused");
            return Ok(value.clone());
        }

        let value = compute()?;
        debug!(operation, "memoized result recorded");
        *recorded = Some(Arc::new(value.clone()));
        Ok(value)
    }

    /// Whether a result of type `T` is recorded for `operation`.
    pub fn is_memoized<T: 'static>(&self, operation: &'static str) -> bool {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.get(&(operation, TypeId::of::<T>())).cloned()
        };
        let Some(slot) = slot else {
            return false;
        };
        let recorded = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        recorded.is_some()
    }

    /// Number of operations with a recorded result.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = {
            let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.values().cloned().collect()
        };
        slots
            .iter()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot<T: 'static>(&self, operation: &'static str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            slots
                .entry((operation, TypeId::of::<T>()))
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }
}

impl fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("recorded", &self.len())
            .finish()
    }
}
