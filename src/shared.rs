//! Interned process-lifetime objects

use tracing::debug;

use crate::clock::Clock;
use crate::consts::SHARED_INTEGERS;
use crate::object::{make_shared, new_object, Obj, StringValue, Value};
use crate::policy::MaxmemoryPolicy;

/// The interned small-integer pool.
///
/// Built exactly once while the server is constructed and read-only from
/// then on: members carry the shared refcount, are never mutated and never
/// freed, so any reader observes a stable object without synchronization.
/// Canned reply text lives as `&'static str` constants in [`crate::reply`],
/// interned for the process lifetime by the language itself.
#[derive(Debug)]
pub struct SharedObjects {
    integers: Vec<Obj>,
}

impl SharedObjects {
    pub(crate) fn create(clock: &dyn Clock, policy: MaxmemoryPolicy) -> Self {
        let integers = (0..SHARED_INTEGERS)
            .map(|v| make_shared(new_object(Value::String(StringValue::Int(v as i64)), clock, policy)))
            .collect();
        debug!(count = SHARED_INTEGERS, "interned shared integer pool built");
        Self { integers }
    }

    /// The interned object for `value`. Traps outside `[0, SHARED_INTEGERS)`.
    pub fn integer(&self, value: usize) -> &Obj {
        &self.integers[value]
    }

    /// Number of interned integers.
    pub fn len(&self) -> usize {
        self.integers.len()
    }

    /// The pool is never empty once built.
    pub fn is_empty(&self) -> bool {
        self.integers.is_empty()
    }
}
