//! Container facades backing the aggregate encodings.
//!
//! The real list/set/hash machinery lives outside this subsystem; these
//! types expose only what the value layer consumes: construction, release
//! and count/size introspection.

pub mod dict;
pub mod intset;
pub mod quicklist;
pub mod ziplist;
pub mod zset;

pub use dict::{Dict, DICT_ENTRY_SIZE};
pub use intset::IntSet;
pub use quicklist::{Quicklist, QuicklistNode};
pub use ziplist::Ziplist;
pub use zset::{Zset, ZsetNode};
