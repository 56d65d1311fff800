//! Eviction policy flags consumed by object creation and encoding

use bitflags::bitflags;

bitflags! {
    /// Behavioral flags of the configured maxmemory policy.
    ///
    /// Only the flags are consumed here; the concrete eviction algorithm
    /// lives outside this subsystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MaxmemoryPolicy: u32 {
        /// The policy tracks per-object recency.
        const LRU = 1 << 0;
        /// The policy tracks per-object access frequency.
        const LFU = 1 << 1;
        /// Policies needing a private recency word per object cannot use
        /// the interned integer pool.
        const NO_SHARED_INTEGERS = Self::LRU.bits() | Self::LFU.bits();
    }
}

impl Default for MaxmemoryPolicy {
    fn default() -> Self {
        Self::empty()
    }
}

impl MaxmemoryPolicy {
    /// Return `true` when objects carry the LFU minute/counter word.
    pub const fn uses_lfu(&self) -> bool {
        self.contains(Self::LFU)
    }
}
