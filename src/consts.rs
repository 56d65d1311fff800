//! Value subsystem parameters

/* STRING ENCODING */

/// Longest string stored with the embedded encoding, in bytes.
///
/// The limit keeps the whole object inside a single small-arena allocation;
/// anything longer falls back to a heap-owned dynamic string.
pub const EMBSTR_SIZE_LIMIT: usize = 44;

/// Longest byte string that can possibly spell a signed 64-bit integer.
pub const INT_ENCODING_MAX_LEN: usize = 20;

/* SHARED OBJECTS */

/// Number of interned small-integer objects, covering `[0, SHARED_INTEGERS)`.
pub const SHARED_INTEGERS: usize = 10_000;

/// Sentinel reference count marking a process-lifetime shared object.
///
/// Increments and decrements against this value are no-ops.
pub const SHARED_REFCOUNT: u32 = i32::MAX as u32;

/* EVICTION CLOCK */

/// Width of the per-object recency word.
pub const LRU_BITS: u32 = 24;

/// Maximum value of the recency clock before it wraps.
pub const LRU_CLOCK_MAX: u32 = (1 << LRU_BITS) - 1;

/// Initial logarithmic access counter for objects created under LFU.
pub const LFU_INIT_VAL: u8 = 5;

/* MEMORY INTROSPECTION */

/// Default element sample count for aggregate size estimation.
pub const DEFAULT_SIZE_SAMPLES: usize = 5;

/// Below this allocation level the doctor considers the instance empty.
pub const DOCTOR_EMPTY_LIMIT: u64 = 5 * 1024 * 1024;

/// Peak-to-used ratio above which the doctor reports a memory peak.
pub const DOCTOR_PEAK_RATIO: f64 = 1.5;

/// Fragmentation ratio above which the doctor reports fragmentation.
pub const DOCTOR_FRAG_RATIO: f64 = 1.4;

/// Average per-client buffer size the doctor tolerates, in bytes.
pub const DOCTOR_CLIENT_BUF_LIMIT: u64 = 200 * 1024;

/// Average per-replica buffer size the doctor tolerates, in bytes.
pub const DOCTOR_REPLICA_BUF_LIMIT: u64 = 10 * 1024 * 1024;
