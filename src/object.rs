//! Value object representation and reference-count lifecycle

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::clock::Clock;
use crate::consts::{EMBSTR_SIZE_LIMIT, LFU_INIT_VAL, LRU_CLOCK_MAX, SHARED_INTEGERS, SHARED_REFCOUNT};
use crate::containers::{Dict, IntSet, Quicklist, Ziplist, Zset};
use crate::policy::MaxmemoryPolicy;
use crate::sds::Sds;
use crate::server::Server;
use crate::util;

/// Logical type of a value object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectType {
    /// Byte string or integer.
    String,
    /// Ordered list of byte strings.
    List,
    /// Unordered set of unique byte strings.
    Set,
    /// Set of byte strings ordered by score.
    Zset,
    /// Field/value map.
    Hash,
    /// Opaque extension value owned by a module.
    Module,
}

/// Concrete in-memory representation of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// Heap-owned dynamic string.
    Raw,
    /// Integer held directly in the payload slot.
    Int,
    /// Hash table.
    Ht,
    /// Packed list blob.
    Ziplist,
    /// Reserved legacy tag; never attached to a live object.
    LinkedList,
    /// Packed sorted integers.
    Intset,
    /// Skip list plus member table.
    Skiplist,
    /// String bytes embedded in the object allocation.
    Embstr,
    /// List of packed nodes.
    Quicklist,
}

impl Encoding {
    /// Stable user-visible encoding name.
    pub const fn name(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Int => "int",
            Encoding::Ht => "hashtable",
            Encoding::Quicklist => "quicklist",
            Encoding::Ziplist => "ziplist",
            Encoding::Intset => "intset",
            Encoding::Skiplist => "skiplist",
            Encoding::Embstr => "embstr",
            Encoding::LinkedList => "unknown",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// String bytes co-allocated with the object header.
///
/// Header and contents share the one allocation, which is the whole point
/// of the encoding: one small string costs one allocation.
#[derive(Debug, Clone)]
pub struct EmbStr {
    len: u8,
    buf: [u8; EMBSTR_SIZE_LIMIT],
}

impl EmbStr {
    /// Copy `bytes` into an embedded buffer. Traps beyond the size limit.
    pub fn new(bytes: &[u8]) -> Self {
        assert!(
            bytes.len() <= EMBSTR_SIZE_LIMIT,
            "embedded string over the {EMBSTR_SIZE_LIMIT} byte limit"
        );
        let mut buf = [0u8; EMBSTR_SIZE_LIMIT];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            len: bytes.len() as u8,
            buf,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// `true` when the string holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View of the byte contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

/// String payloads.
#[derive(Debug)]
pub enum StringValue {
    /// Integer in the payload slot.
    Int(i64),
    /// Bytes inside the object allocation.
    Embedded(EmbStr),
    /// Heap-owned dynamic string.
    Raw(Sds),
}

/// List payloads.
#[derive(Debug)]
pub enum ListValue {
    /// Chain of packed nodes.
    Quicklist(Quicklist),
    /// Single packed blob.
    Ziplist(Ziplist),
}

/// Set payloads.
#[derive(Debug)]
pub enum SetValue {
    /// Hash table of members.
    Ht(Dict<()>),
    /// Packed sorted integers.
    Intset(IntSet),
}

/// Sorted-set payloads.
#[derive(Debug)]
pub enum ZsetValue {
    /// Skip list plus member table.
    Skiplist(Box<Zset>),
    /// Single packed blob of member/score pairs.
    Ziplist(Ziplist),
}

/// Hash payloads.
#[derive(Debug)]
pub enum HashValue {
    /// Hash table of fields.
    Ht(Dict<Sds>),
    /// Single packed blob of field/value pairs.
    Ziplist(Ziplist),
}

/// Behavior a module registers for its opaque values.
pub trait ModuleType {
    /// Module type name shown in diagnostics.
    fn name(&self) -> &'static str;

    /// Release an opaque value. Invoked exactly once, when the owning
    /// object is destroyed.
    fn free(&self, value: Box<dyn Any>);

    /// Report the value's heap cost, if the module tracks one.
    fn mem_usage(&self, value: &dyn Any) -> Option<usize> {
        let _ = value;
        None
    }
}

/// Opaque module value plus the vtable that knows how to handle it.
pub struct ModuleValue {
    mtype: Rc<dyn ModuleType>,
    value: Option<Box<dyn Any>>,
}

impl ModuleValue {
    pub(crate) fn new(mtype: Rc<dyn ModuleType>, value: Box<dyn Any>) -> Self {
        Self {
            mtype,
            value: Some(value),
        }
    }

    /// The registered module type.
    pub fn module_type(&self) -> &Rc<dyn ModuleType> {
        &self.mtype
    }

    /// The wrapped value.
    pub fn value(&self) -> &dyn Any {
        self.value
            .as_deref()
            .expect("module value present until destruction")
    }

    pub(crate) fn mem_usage(&self) -> usize {
        self.value
            .as_deref()
            .and_then(|v| self.mtype.mem_usage(v))
            .unwrap_or(0)
    }
}

impl Drop for ModuleValue {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.mtype.free(value);
        }
    }
}

impl fmt::Debug for ModuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleValue({})", self.mtype.name())
    }
}

/// Payload of a value object.
///
/// One variant per legal (type, encoding) pair, so an illegal pairing is
/// unrepresentable rather than trapped at runtime. Dropping a payload runs
/// the per-type destructor, including the module `free` callback.
#[derive(Debug)]
pub enum Value {
    /// String payloads.
    String(StringValue),
    /// List payloads.
    List(ListValue),
    /// Set payloads.
    Set(SetValue),
    /// Sorted-set payloads.
    Zset(ZsetValue),
    /// Hash payloads.
    Hash(HashValue),
    /// Opaque module payload; the encoding tag is unused.
    Module(ModuleValue),
}

impl Value {
    /// Logical type of this payload.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Value::String(_) => ObjectType::String,
            Value::List(_) => ObjectType::List,
            Value::Set(_) => ObjectType::Set,
            Value::Zset(_) => ObjectType::Zset,
            Value::Hash(_) => ObjectType::Hash,
            Value::Module(_) => ObjectType::Module,
        }
    }

    /// Current encoding of this payload.
    pub fn encoding(&self) -> Encoding {
        match self {
            Value::String(StringValue::Raw(_)) => Encoding::Raw,
            Value::String(StringValue::Int(_)) => Encoding::Int,
            Value::String(StringValue::Embedded(_)) => Encoding::Embstr,
            Value::List(ListValue::Quicklist(_)) => Encoding::Quicklist,
            Value::List(ListValue::Ziplist(_)) => Encoding::Ziplist,
            Value::Set(SetValue::Ht(_)) => Encoding::Ht,
            Value::Set(SetValue::Intset(_)) => Encoding::Intset,
            Value::Zset(ZsetValue::Skiplist(_)) => Encoding::Skiplist,
            Value::Zset(ZsetValue::Ziplist(_)) => Encoding::Ziplist,
            Value::Hash(HashValue::Ht(_)) => Encoding::Ht,
            Value::Hash(HashValue::Ziplist(_)) => Encoding::Ziplist,
            Value::Module(_) => Encoding::Raw,
        }
    }
}

/// A value object: header fields plus payload.
///
/// All interior mutability is single-threaded (`Cell`/`RefCell`); the type
/// is deliberately `!Sync`, which enforces the subsystem's concurrency
/// model at compile time.
#[derive(Debug)]
pub struct Object {
    refcount: Cell<u32>,
    lru: Cell<u32>,
    value: RefCell<Value>,
}

/// Shared handle to a value object.
///
/// Handles are cheap to clone; the *logical* reference count is the header
/// field driven by [`incr_ref_count`]/[`decr_ref_count`], which is what the
/// `OBJECT REFCOUNT` command reports.
pub type Obj = Rc<Object>;

impl Object {
    /// Logical type tag.
    pub fn object_type(&self) -> ObjectType {
        self.value.borrow().object_type()
    }

    /// Current encoding tag.
    pub fn encoding(&self) -> Encoding {
        self.value.borrow().encoding()
    }

    /// Logical reference count. [`SHARED_REFCOUNT`] marks an immortal
    /// object.
    pub fn refcount(&self) -> u32 {
        self.refcount.get()
    }

    /// `true` for process-lifetime shared objects.
    pub fn is_shared(&self) -> bool {
        self.refcount.get() == SHARED_REFCOUNT
    }

    /// Raw 24-bit eviction metadata word.
    pub fn lru(&self) -> u32 {
        self.lru.get()
    }

    /// Overwrite the eviction metadata word (eviction layer interface).
    pub fn set_lru(&self, lru: u32) {
        self.lru.set(lru & LRU_CLOCK_MAX);
    }

    /// Logarithmic access counter, meaningful under an LFU policy.
    pub fn freq(&self) -> u8 {
        (self.lru.get() & 0xff) as u8
    }

    /// Seconds since last access, computed against the recency clock.
    /// Meaningful under an LRU-family policy.
    pub fn idle_time_seconds(&self, clock: &dyn Clock) -> u64 {
        let now = clock.lru_clock();
        let lru = self.lru.get();
        if now >= lru {
            u64::from(now - lru)
        } else {
            u64::from(now) + u64::from(LRU_CLOCK_MAX - lru)
        }
    }

    /// `true` when the payload is an actual array of chars (raw or
    /// embedded), the only shapes the encoding optimizer works on.
    pub fn is_sds_encoded(&self) -> bool {
        matches!(
            &*self.value.borrow(),
            Value::String(StringValue::Raw(_) | StringValue::Embedded(_))
        )
    }

    /// Run `f` over the string bytes. Integer payloads are rendered to a
    /// stack buffer first. Traps on non-string objects.
    pub fn with_string_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        match &*self.value.borrow() {
            Value::String(StringValue::Raw(s)) => f(s.as_bytes()),
            Value::String(StringValue::Embedded(e)) => f(e.as_bytes()),
            Value::String(StringValue::Int(v)) => {
                let mut buf = [0u8; 21];
                let len = util::i64_to_bytes(&mut buf, *v);
                f(&buf[..len])
            }
            _ => panic!("string access on a non-string object"),
        }
    }

    /// String length in bytes; digit count for the integer encoding.
    pub fn string_len(&self) -> usize {
        match &*self.value.borrow() {
            Value::String(StringValue::Raw(s)) => s.len(),
            Value::String(StringValue::Embedded(e)) => e.len(),
            Value::String(StringValue::Int(v)) => util::decimal_digits(*v),
            _ => panic!("string length of a non-string object"),
        }
    }

    /// Borrow the payload.
    pub fn value(&self) -> Ref<'_, Value> {
        self.value.borrow()
    }

    pub(crate) fn value_mut(&self) -> RefMut<'_, Value> {
        self.value.borrow_mut()
    }
}

/// Allocate a fresh object around `value` with a logical count of one and
/// the eviction word primed for the configured policy.
pub fn new_object(value: Value, clock: &dyn Clock, policy: MaxmemoryPolicy) -> Obj {
    let lru = if policy.uses_lfu() {
        (u32::from(clock.lfu_minutes()) << 8) | u32::from(LFU_INIT_VAL)
    } else {
        clock.lru_clock()
    };
    Rc::new(Object {
        refcount: Cell::new(1),
        lru: Cell::new(lru),
        value: RefCell::new(value),
    })
}

/// Register one more logical owner and hand back its handle.
/// No-op on the counter of shared objects.
pub fn incr_ref_count(o: &Obj) -> Obj {
    let count = o.refcount.get();
    if count != SHARED_REFCOUNT {
        o.refcount.set(count + 1);
    }
    Rc::clone(o)
}

/// Drop one logical owner, consuming its handle. At one remaining owner the
/// payload is released (per-type destructor, module `free` included). A
/// decrement against a count of zero is a caller bug and traps.
pub fn decr_ref_count(o: Obj) {
    match o.refcount.get() {
        SHARED_REFCOUNT => (),
        0 => panic!("refcount decremented below zero"),
        1 => {
            o.refcount.set(0);
            drop(o);
        }
        n => o.refcount.set(n - 1),
    }
}

/// Zero the logical count without releasing, so a fresh object can be
/// handed straight to a callee that registers its own reference:
///
/// ```ignore
/// callee_that_increments(reset_ref_count(server.create_object(value)));
/// ```
pub fn reset_ref_count(o: Obj) -> Obj {
    o.refcount.set(0);
    o
}

/// Turn a freshly created object into a process-lifetime shared one.
/// Requires sole ownership at entry.
pub fn make_shared(o: Obj) -> Obj {
    assert_eq!(o.refcount.get(), 1, "only a sole owner can share an object");
    o.refcount.set(SHARED_REFCOUNT);
    o
}

impl Server {
    /// Wrap `value` in a fresh object under this server's clock and policy.
    pub fn create_object(&self, value: Value) -> Obj {
        new_object(value, self.clock(), self.policy())
    }

    /// String object, embedded below the size limit and raw above it.
    pub fn create_string_object(&self, bytes: &[u8]) -> Obj {
        if bytes.len() <= EMBSTR_SIZE_LIMIT {
            self.create_embedded_string_object(bytes)
        } else {
            self.create_raw_string_object(bytes)
        }
    }

    /// String object owning a heap dynamic string.
    pub fn create_raw_string_object(&self, bytes: &[u8]) -> Obj {
        self.create_object(Value::String(StringValue::Raw(Sds::new(bytes))))
    }

    /// String object with the bytes embedded in the object allocation.
    pub fn create_embedded_string_object(&self, bytes: &[u8]) -> Obj {
        self.create_object(Value::String(StringValue::Embedded(EmbStr::new(bytes))))
    }

    /// String object for an integer: the interned shared object for small
    /// non-negative values when the eviction policy permits interning, a
    /// private integer payload otherwise.
    pub fn create_string_object_from_long_long(&self, value: i64) -> Obj {
        if self.shared_integers_enabled() && (0..SHARED_INTEGERS as i64).contains(&value) {
            incr_ref_count(self.shared().integer(value as usize))
        } else {
            self.create_object(Value::String(StringValue::Int(value)))
        }
    }

    /// String object for a high-precision float. `humanfriendly` trades
    /// precision for a fixed-point rendering without trailing zeroes.
    pub fn create_string_object_from_long_double(&self, value: f64, humanfriendly: bool) -> Obj {
        let s = util::f64_to_string(value, humanfriendly);
        self.create_string_object(s.as_bytes())
    }

    /// Fresh unshared copy of a string object with the same encoding.
    /// A duplicated small integer is never re-interned.
    pub fn dup_string_object(&self, o: &Obj) -> Obj {
        match &*o.value() {
            Value::String(StringValue::Raw(s)) => self.create_raw_string_object(s.as_bytes()),
            Value::String(StringValue::Embedded(e)) => {
                self.create_embedded_string_object(e.as_bytes())
            }
            Value::String(StringValue::Int(v)) => {
                self.create_object(Value::String(StringValue::Int(*v)))
            }
            _ => panic!("duplicate of a non-string object"),
        }
    }

    /// String-form view of an encoded object: raw/embedded strings are
    /// handed back with one more owner, integers are rendered into a new
    /// string object.
    pub fn get_decoded_object(&self, o: &Obj) -> Obj {
        if o.is_sds_encoded() {
            return incr_ref_count(o);
        }
        match &*o.value() {
            Value::String(StringValue::Int(v)) => {
                let mut buf = [0u8; 21];
                let len = util::i64_to_bytes(&mut buf, *v);
                self.create_string_object(&buf[..len])
            }
            _ => panic!("decode of a non-string object"),
        }
    }

    /// Empty list in the quicklist encoding.
    pub fn create_quicklist_object(&self) -> Obj {
        self.create_object(Value::List(ListValue::Quicklist(Quicklist::new())))
    }

    /// Empty list in the packed encoding.
    pub fn create_ziplist_object(&self) -> Obj {
        self.create_object(Value::List(ListValue::Ziplist(Ziplist::new())))
    }

    /// Empty set in the hash-table encoding.
    pub fn create_set_object(&self) -> Obj {
        self.create_object(Value::Set(SetValue::Ht(Dict::new())))
    }

    /// Empty set in the packed integer encoding.
    pub fn create_intset_object(&self) -> Obj {
        self.create_object(Value::Set(SetValue::Intset(IntSet::new())))
    }

    /// Empty hash in the packed encoding.
    pub fn create_hash_object(&self) -> Obj {
        self.create_object(Value::Hash(HashValue::Ziplist(Ziplist::new())))
    }

    /// Empty sorted set in the skip-list encoding.
    pub fn create_zset_object(&self) -> Obj {
        self.create_object(Value::Zset(ZsetValue::Skiplist(Box::new(Zset::new()))))
    }

    /// Empty sorted set in the packed encoding.
    pub fn create_zset_ziplist_object(&self) -> Obj {
        self.create_object(Value::Zset(ZsetValue::Ziplist(Ziplist::new())))
    }

    /// Opaque module value wrapped as an object.
    pub fn create_module_object(&self, mtype: Rc<dyn ModuleType>, value: Box<dyn Any>) -> Obj {
        self.create_object(Value::Module(ModuleValue::new(mtype, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::server::{Config, LibcAllocator};

    fn test_server() -> Server {
        Server::with_parts(
            Config::default(),
            Box::new(ManualClock::new(1000)),
            Box::new(LibcAllocator),
        )
    }

    #[test]
    fn embedded_encoding_below_the_limit() {
        let server = test_server();
        let o = server.create_string_object(&[b'x'; EMBSTR_SIZE_LIMIT]);
        assert_eq!(o.encoding(), Encoding::Embstr);

        let o = server.create_string_object(&[b'x'; EMBSTR_SIZE_LIMIT + 1]);
        assert_eq!(o.encoding(), Encoding::Raw);
    }

    #[test]
    fn refcount_round_trip_is_identity() {
        let server = test_server();
        let o = server.create_string_object(b"payload");
        assert_eq!(o.refcount(), 1);
        let lru = o.lru();

        let extra = incr_ref_count(&o);
        assert_eq!(o.refcount(), 2);
        decr_ref_count(extra);
        assert_eq!(o.refcount(), 1);
        assert_eq!(o.lru(), lru);
        o.with_string_bytes(|b| assert_eq!(b, b"payload"));
    }

    #[test]
    fn final_decrement_releases_the_object() {
        let server = test_server();
        let o = server.create_string_object(b"short lived");
        let probe = Rc::downgrade(&o);
        decr_ref_count(o);
        assert!(probe.upgrade().is_none());
    }

    #[test]
    #[should_panic(expected = "below zero")]
    fn decrement_after_reset_traps() {
        let server = test_server();
        let o = reset_ref_count(server.create_string_object(b"zeroed"));
        decr_ref_count(o);
    }

    #[test]
    fn shared_objects_ignore_refcount_traffic() {
        let server = test_server();
        let o = make_shared(server.create_object(Value::String(StringValue::Int(7))));
        assert!(o.is_shared());

        let extra = incr_ref_count(&o);
        assert_eq!(extra.refcount(), SHARED_REFCOUNT);
        decr_ref_count(extra);
        assert_eq!(o.refcount(), SHARED_REFCOUNT);
    }

    #[test]
    fn dup_preserves_encoding_and_never_interns() {
        let server = test_server();

        let shared = server.create_string_object_from_long_long(42);
        assert!(shared.is_shared());
        let dup = server.dup_string_object(&shared);
        assert_eq!(dup.encoding(), Encoding::Int);
        assert_eq!(dup.refcount(), 1);

        let raw = server.create_raw_string_object(b"raw bytes");
        assert_eq!(server.dup_string_object(&raw).encoding(), Encoding::Raw);

        let emb = server.create_embedded_string_object(b"emb");
        assert_eq!(server.dup_string_object(&emb).encoding(), Encoding::Embstr);
    }

    #[test]
    fn encoding_names_stay_in_the_fixed_set() {
        use strum::IntoEnumIterator;

        let names = [
            "raw",
            "int",
            "hashtable",
            "quicklist",
            "ziplist",
            "intset",
            "skiplist",
            "embstr",
            "unknown",
        ];
        for encoding in Encoding::iter() {
            assert!(names.contains(&encoding.name()), "{encoding:?}");
        }
    }

    #[test]
    fn string_len_counts_integer_digits() {
        let server = test_server();
        let o = server.create_string_object_from_long_long(-12045);
        assert_eq!(o.string_len(), 6);
        let o = server.create_string_object(b"hello");
        assert_eq!(o.string_len(), 5);
    }

    #[test]
    fn lfu_policy_primes_the_counter() {
        let config = Config {
            maxmemory_policy: MaxmemoryPolicy::LFU,
            ..Config::default()
        };
        let server = Server::with_parts(
            config,
            Box::new(ManualClock::new(120)),
            Box::new(LibcAllocator),
        );
        let o = server.create_string_object(b"fresh");
        assert_eq!(o.freq(), LFU_INIT_VAL);
        assert_eq!(o.lru() >> 8, 2);
    }

    #[test]
    fn idle_time_follows_the_recency_clock() {
        let clock = ManualClock::new(5_000);
        let server = Server::with_parts(
            Config::default(),
            Box::new(ManualClock::new(5_000)),
            Box::new(LibcAllocator),
        );
        let o = server.create_string_object(b"idle");
        clock.set(5_090);
        assert_eq!(o.idle_time_seconds(&clock), 90);
    }
}
