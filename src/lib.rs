//! Polymorphic value objects for the Brine in-memory key-value store.
//!
//! Every value held under a key is represented by an [`object::Object`]: a
//! small header carrying the logical type, the current encoding, a logical
//! reference count and an eviction-metadata word, plus the payload itself.
//! The subsystem picks the cheapest encoding for the common case, shares
//! small immutable integers process-wide, and answers the `OBJECT` and
//! `MEMORY` introspection commands.

pub mod clock;
pub mod command;
pub mod compare;
pub mod consts;
pub mod containers;
pub mod encoding;
pub mod error;
pub mod memory;
pub mod numeric;
pub mod object;
pub mod policy;
pub mod reply;
pub mod sds;
pub mod server;
pub mod shared;
pub mod util;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::command::check_type;
    pub use crate::compare::{collate_string_objects, compare_string_objects, equal_string_objects};
    pub use crate::containers::{Dict, IntSet, Quicklist, Ziplist, Zset};
    pub use crate::error::ObjectError;
    pub use crate::memory::{object_compute_size, DbOverhead, MemoryOverhead};
    pub use crate::numeric::{
        get_double_from_object, get_long_double_from_object, get_long_long_from_object,
    };
    pub use crate::object::{
        decr_ref_count, incr_ref_count, make_shared, reset_ref_count, EmbStr, Encoding, HashValue,
        ListValue, ModuleType, Obj, Object, ObjectType, SetValue, StringValue, Value, ZsetValue,
    };
    pub use crate::policy::MaxmemoryPolicy;
    pub use crate::reply::{RecordingReply, Reply, ReplyFrame};
    pub use crate::sds::Sds;
    pub use crate::server::{Allocator, ClientInfo, Config, Db, LibcAllocator, Server};
    pub use crate::shared::SharedObjects;
}
