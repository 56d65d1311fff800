//! The `OBJECT` and `MEMORY` introspection commands

use tracing::debug;

use crate::consts::DEFAULT_SIZE_SAMPLES;
use crate::containers::DICT_ENTRY_SIZE;
use crate::memory::object_compute_size;
use crate::numeric::get_long_long_from_object_or_reply;
use crate::object::{Obj, Object, ObjectType};
use crate::policy::MaxmemoryPolicy;
use crate::reply::{Reply, SYNTAX_ERR, WRONG_TYPE_ERR};
use crate::server::Server;

const OBJECT_SYNTAX_ERR: &str = "Syntax error. Try OBJECT (refcount|encoding|idletime|freq)";
const MEMORY_SYNTAX_ERR: &str = "Syntax error. Try MEMORY HELP";
const IDLETIME_LFU_ERR: &str = "An LFU maxmemory policy is selected, idle time not tracked. \
     Please note that when switching between policies at runtime LRU and LFU data will take \
     some time to adjust.";
const FREQ_LRU_ERR: &str = "An LRU maxmemory policy is selected, access frequency not tracked. \
     Please note that when switching between policies at runtime LRU and LFU data will take \
     some time to adjust.";
const MALLOC_STATS_UNSUPPORTED: &str = "Stats not supported for the current allocator";

const MEMORY_HELP: [&str; 4] = [
    "MEMORY USAGE <key> [SAMPLES <count>] - Estimate memory usage of key",
    "MEMORY STATS                         - Show memory usage details",
    "MEMORY PURGE                         - Ask the allocator to release memory",
    "MEMORY MALLOC-STATS                  - Show allocator internal stats",
];

fn arg_is(arg: &Object, name: &str) -> bool {
    arg.with_string_bytes(|b| b.eq_ignore_ascii_case(name.as_bytes()))
}

/// Reply the canned wrong-type error unless `o` has the expected type.
/// Returns `true` when the type mismatched and the error was sent.
pub fn check_type(reply: &mut dyn Reply, o: &Object, expected: ObjectType) -> bool {
    if o.object_type() != expected {
        reply.error(WRONG_TYPE_ERR);
        true
    } else {
        false
    }
}

impl Server {
    /// Key lookup for introspection commands: never touches the recency
    /// metadata of the value.
    fn object_command_lookup<'a>(&'a self, db_index: usize, key: &Object) -> Option<&'a Obj> {
        key.with_string_bytes(|k| self.db(db_index).lookup(k))
    }

    fn lookup_or_null<'a>(
        &'a self,
        db_index: usize,
        key: &Object,
        reply: &mut dyn Reply,
    ) -> Option<&'a Obj> {
        let found = self.object_command_lookup(db_index, key);
        if found.is_none() {
            reply.null_bulk();
        }
        found
    }

    /// `OBJECT <refcount|encoding|idletime|freq> <key>`
    pub fn object_command(&self, db_index: usize, argv: &[Obj], reply: &mut dyn Reply) {
        if argv.len() < 2 {
            reply.error(OBJECT_SYNTAX_ERR);
            return;
        }
        let sub = &argv[1];

        if arg_is(sub, "refcount") && argv.len() == 3 {
            let o = match self.lookup_or_null(db_index, &argv[2], reply) {
                Some(o) => o,
                None => return,
            };
            reply.integer(i64::from(o.refcount()));
        } else if arg_is(sub, "encoding") && argv.len() == 3 {
            let o = match self.lookup_or_null(db_index, &argv[2], reply) {
                Some(o) => o,
                None => return,
            };
            reply.bulk_str(o.encoding().name());
        } else if arg_is(sub, "idletime") && argv.len() == 3 {
            let o = match self.lookup_or_null(db_index, &argv[2], reply) {
                Some(o) => o,
                None => return,
            };
            if self.policy().contains(MaxmemoryPolicy::LFU) {
                reply.error(IDLETIME_LFU_ERR);
                return;
            }
            reply.integer(o.idle_time_seconds(self.clock()) as i64);
        } else if arg_is(sub, "freq") && argv.len() == 3 {
            let o = match self.lookup_or_null(db_index, &argv[2], reply) {
                Some(o) => o,
                None => return,
            };
            if self.policy().contains(MaxmemoryPolicy::LRU) {
                reply.error(FREQ_LRU_ERR);
                return;
            }
            reply.integer(i64::from(o.freq()));
        } else {
            reply.error(OBJECT_SYNTAX_ERR);
        }
    }

    /// `MEMORY <usage|stats|malloc-stats|doctor|purge|help>`
    pub fn memory_command(&self, db_index: usize, argv: &[Obj], reply: &mut dyn Reply) {
        if argv.len() < 2 {
            reply.error(MEMORY_SYNTAX_ERR);
            return;
        }
        let sub = &argv[1];

        if arg_is(sub, "usage") && argv.len() >= 3 {
            let mut samples = DEFAULT_SIZE_SAMPLES;
            let mut j = 3;
            // Everything after the key is SAMPLES <count> pairs; the last
            // pair wins. The scan doubles as argument validation, so it
            // runs before the key lookup.
            while j < argv.len() {
                if arg_is(&argv[j], "samples") && j + 1 < argv.len() {
                    let count =
                        match get_long_long_from_object_or_reply(reply, &argv[j + 1], None) {
                            Ok(count) => count,
                            Err(_) => return,
                        };
                    if count < 0 {
                        reply.error(SYNTAX_ERR);
                        return;
                    }
                    samples = if count == 0 {
                        usize::MAX
                    } else {
                        count as usize
                    };
                    j += 2;
                } else {
                    reply.error(SYNTAX_ERR);
                    return;
                }
            }
            let o = match self.lookup_or_null(db_index, &argv[2], reply) {
                Some(o) => o,
                None => return,
            };
            let mut usage = object_compute_size(o, samples);
            usage += argv[2].with_string_bytes(<[u8]>::len);
            usage += DICT_ENTRY_SIZE;
            reply.integer(usage as i64);
        } else if arg_is(sub, "stats") && argv.len() == 2 {
            let mh = self.memory_overhead();

            reply.array_len((14 + mh.dbs.len()) * 2);

            reply.bulk_str("peak.allocated");
            reply.integer(mh.peak_allocated as i64);

            reply.bulk_str("total.allocated");
            reply.integer(mh.total_allocated as i64);

            reply.bulk_str("startup.allocated");
            reply.integer(mh.startup_allocated as i64);

            reply.bulk_str("replication.backlog");
            reply.integer(mh.repl_backlog as i64);

            reply.bulk_str("clients.slaves");
            reply.integer(mh.clients_slaves as i64);

            reply.bulk_str("clients.normal");
            reply.integer(mh.clients_normal as i64);

            reply.bulk_str("aof.buffer");
            reply.integer(mh.aof_buffer as i64);

            for db in &mh.dbs {
                reply.bulk_str(&format!("db.{}", db.dbid));
                reply.array_len(4);

                reply.bulk_str("overhead.hashtable.main");
                reply.integer(db.overhead_ht_main as i64);

                reply.bulk_str("overhead.hashtable.expires");
                reply.integer(db.overhead_ht_expires as i64);
            }

            reply.bulk_str("overhead.total");
            reply.integer(mh.overhead_total as i64);

            reply.bulk_str("keys.count");
            reply.integer(mh.total_keys as i64);

            reply.bulk_str("keys.bytes-per-key");
            reply.integer(mh.bytes_per_key as i64);

            reply.bulk_str("dataset.bytes");
            reply.integer(mh.dataset as i64);

            reply.bulk_str("dataset.percentage");
            reply.double(mh.dataset_perc);

            reply.bulk_str("peak.percentage");
            reply.double(mh.peak_perc);

            reply.bulk_str("fragmentation");
            reply.double(mh.fragmentation);
        } else if arg_is(sub, "malloc-stats") && argv.len() == 2 {
            match self.allocator().native_stats() {
                Some(stats) => reply.bulk_str(&stats),
                None => reply.bulk_str(MALLOC_STATS_UNSUPPORTED),
            }
        } else if arg_is(sub, "doctor") && argv.len() == 2 {
            reply.bulk_str(&self.memory_doctor_report());
        } else if arg_is(sub, "purge") && argv.len() == 2 {
            let purged = self.allocator().purge();
            debug!(purged, "allocator purge hint");
            reply.ok();
        } else if arg_is(sub, "help") && argv.len() == 2 {
            reply.array_len(MEMORY_HELP.len());
            for line in MEMORY_HELP {
                reply.bulk_str(line);
            }
        } else {
            reply.error(MEMORY_SYNTAX_ERR);
        }
    }
}
