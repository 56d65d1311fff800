//! Host context consumed by the value subsystem.
//!
//! The keyspace, client list, replication buffers and allocator are
//! external collaborators; this module models just enough of them for the
//! subsystem's own surface: object creation, encoding optimization and
//! the `OBJECT`/`MEMORY` commands.

use std::fmt;

use crate::clock::{Clock, SystemClock};
use crate::containers::Dict;
use crate::object::Obj;
use crate::policy::MaxmemoryPolicy;
use crate::sds::Sds;
use crate::shared::SharedObjects;

/// Server configuration consumed by this subsystem.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Number of keyspaces.
    pub db_count: usize,
    /// Memory ceiling in bytes; zero disables the limit.
    pub maxmemory: u64,
    /// Behavioral flags of the eviction policy.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub maxmemory_policy: MaxmemoryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_count: 16,
            maxmemory: 0,
            maxmemory_policy: MaxmemoryPolicy::default(),
        }
    }
}

/// Allocator hooks consumed by the `MEMORY` command.
pub trait Allocator {
    /// Allocator name interpolated into operator-facing reports.
    fn name(&self) -> &'static str;

    /// Allocator-native statistics dump, when the allocator has one.
    fn native_stats(&self) -> Option<String> {
        None
    }

    /// Ask the allocator to release retained dirty pages.
    /// Returns `true` when the hint did something.
    fn purge(&self) -> bool {
        false
    }
}

/// The plain libc allocator: no stats dump, no purge hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcAllocator;

impl Allocator for LibcAllocator {
    fn name(&self) -> &'static str {
        "libc"
    }
}

/// Allocator-level memory readings, updated by the host.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryMetrics {
    used_memory: u64,
    startup_memory: u64,
    peak_memory: u64,
    resident_set_size: u64,
}

impl MemoryMetrics {
    /// Record the current in-use allocation level, tracking the peak.
    pub fn set_used_memory(&mut self, bytes: u64) {
        self.used_memory = bytes;
        self.peak_memory = self.peak_memory.max(bytes);
    }

    /// Record the allocation level at the end of initialization.
    pub fn mark_startup(&mut self) {
        self.startup_memory = self.used_memory;
    }

    /// Record the OS-reported resident set size.
    pub fn set_resident_set_size(&mut self, bytes: u64) {
        self.resident_set_size = bytes;
    }

    /// Allocator-reported in-use bytes.
    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    /// In-use bytes recorded when initialization finished.
    pub fn startup_memory(&self) -> u64 {
        self.startup_memory
    }

    /// Highest in-use level observed.
    pub fn peak_memory(&self) -> u64 {
        self.peak_memory
    }

    /// OS-reported resident set size.
    pub fn resident_set_size(&self) -> u64 {
        self.resident_set_size
    }

    /// Resident set size over in-use bytes.
    pub fn fragmentation_ratio(&self) -> f64 {
        self.resident_set_size as f64 / self.used_memory.max(1) as f64
    }
}

/// Per-client buffer accounting, partitioned by the replica flag.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientInfo {
    /// Pending output bytes.
    pub output_buffer: usize,
    /// Allocated query buffer bytes.
    pub query_buffer: usize,
    /// `true` when the client is a replication link.
    pub replica: bool,
}

/// One keyspace: the main key dictionary and its expiry table.
#[derive(Debug, Default)]
pub struct Db {
    pub(crate) dict: Dict<Obj>,
    pub(crate) expires: Dict<u64>,
}

impl Db {
    /// New empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`. The moved handle carries the keyspace's
    /// logical reference.
    pub fn add(&mut self, key: Sds, value: Obj) {
        self.dict.insert(key, value);
    }

    /// Attach an expiry timestamp (milliseconds) to `key`.
    pub fn set_expire(&mut self, key: Sds, at_ms: u64) {
        self.expires.insert(key, at_ms);
    }

    /// Fetch the value under `key` without touching any recency metadata.
    pub fn lookup(&self, key: &[u8]) -> Option<&Obj> {
        self.dict.get(key)
    }

    /// Number of keys.
    pub fn key_count(&self) -> usize {
        self.dict.len()
    }

    /// Number of keys carrying an expiry.
    pub fn expires_count(&self) -> usize {
        self.expires.len()
    }

    /// Bucket slots of the main dictionary.
    pub fn main_slots(&self) -> usize {
        self.dict.slots()
    }

    /// Bucket slots of the expiry dictionary.
    pub fn expires_slots(&self) -> usize {
        self.expires.slots()
    }
}

/// Single-threaded server context owning the value subsystem state.
pub struct Server {
    config: Config,
    clock: Box<dyn Clock>,
    allocator: Box<dyn Allocator>,
    shared: SharedObjects,
    dbs: Vec<Db>,
    clients: Vec<ClientInfo>,
    repl_backlog: u64,
    aof_enabled: bool,
    aof_buffer: u64,
    aof_rewrite_buffer: u64,
    metrics: MemoryMetrics,
}

impl Server {
    /// Server with the system clock and the plain libc allocator.
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Box::new(SystemClock), Box::new(LibcAllocator))
    }

    /// Server with explicit clock and allocator, for hosts and tests.
    pub fn with_parts(
        config: Config,
        clock: Box<dyn Clock>,
        allocator: Box<dyn Allocator>,
    ) -> Self {
        let shared = SharedObjects::create(clock.as_ref(), config.maxmemory_policy);
        let dbs = (0..config.db_count).map(|_| Db::new()).collect();
        Self {
            config,
            clock,
            allocator,
            shared,
            dbs,
            clients: Vec::new(),
            repl_backlog: 0,
            aof_enabled: false,
            aof_buffer: 0,
            aof_rewrite_buffer: 0,
            metrics: MemoryMetrics::default(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The interned object pool.
    pub fn shared(&self) -> &SharedObjects {
        &self.shared
    }

    /// Keyspace `index`.
    pub fn db(&self, index: usize) -> &Db {
        &self.dbs[index]
    }

    /// Mutable keyspace `index`.
    pub fn db_mut(&mut self, index: usize) -> &mut Db {
        &mut self.dbs[index]
    }

    /// All keyspaces, in id order.
    pub fn dbs(&self) -> &[Db] {
        &self.dbs
    }

    /// Register a connected client for buffer accounting.
    pub fn add_client(&mut self, client: ClientInfo) {
        self.clients.push(client);
    }

    /// Connected clients.
    pub fn clients(&self) -> &[ClientInfo] {
        &self.clients
    }

    /// Record the replication backlog allocation.
    pub fn set_repl_backlog(&mut self, bytes: u64) {
        self.repl_backlog = bytes;
    }

    /// Record the append-only-file buffer levels and turn AOF accounting on.
    pub fn set_aof_buffers(&mut self, buffer: u64, rewrite_buffer: u64) {
        self.aof_enabled = true;
        self.aof_buffer = buffer;
        self.aof_rewrite_buffer = rewrite_buffer;
    }

    /// Memory readings.
    pub fn memory_metrics(&self) -> &MemoryMetrics {
        &self.metrics
    }

    /// Mutable memory readings, updated by the host allocator glue.
    pub fn memory_metrics_mut(&mut self) -> &mut MemoryMetrics {
        &mut self.metrics
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }

    pub(crate) fn policy(&self) -> MaxmemoryPolicy {
        self.config.maxmemory_policy
    }

    /// Interning is skipped when the policy needs a private recency word
    /// per object and a memory ceiling is actually enforced.
    pub(crate) fn shared_integers_enabled(&self) -> bool {
        self.config.maxmemory == 0
            || !self
                .config
                .maxmemory_policy
                .intersects(MaxmemoryPolicy::NO_SHARED_INTEGERS)
    }

    pub(crate) fn repl_backlog(&self) -> u64 {
        self.repl_backlog
    }

    pub(crate) fn aof_overhead(&self) -> u64 {
        if self.aof_enabled {
            self.aof_buffer + self.aof_rewrite_buffer
        } else {
            0
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("dbs", &self.dbs.len())
            .field("clients", &self.clients.len())
            .field("allocator", &self.allocator.name())
            .finish()
    }
}
