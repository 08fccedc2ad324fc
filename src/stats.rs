//! Cumulative allocation counters and the sampling stats hook
//!
//! The allocator updates one [`MemStats`] instance on every allocate and
//! free. A consumer that wants live telemetry installs a hook with a sampling
//! frequency; the hook sees a [`StatsSnapshot`] and must not allocate through
//! the instance being observed (re-entrant invocations are suppressed).

use serde::Serialize;

/// Callback observing allocator activity
pub type StatsHook = Box<dyn FnMut(&StatsSnapshot) + Send>;

/// Point-in-time copy of the cumulative counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Allocations performed since construction
    pub total_allocs: u64,
    /// Frees performed since construction
    pub total_frees: u64,
    /// Live allocations right now
    pub live_allocs: u64,
    /// Peak simultaneous live allocations
    pub peak_allocs: u64,
    /// Bytes callers asked for, cumulative
    pub requested_bytes: u64,
    /// Bytes actually granted (size-class rounding included), cumulative
    pub granted_bytes: u64,
    /// Granted bytes returned by frees, cumulative
    pub freed_bytes: u64,
    /// Granted bytes currently live
    pub live_granted_bytes: u64,
    /// Peak of `live_granted_bytes`
    pub peak_granted_bytes: u64,
}

/// Counter state owned by an allocator instance
#[derive(Default)]
pub struct MemStats {
    total_allocs: u64,
    total_frees: u64,
    peak_allocs: u64,
    requested_bytes: u64,
    granted_bytes: u64,
    freed_bytes: u64,
    peak_granted_bytes: u64,
    hook: Option<StatsHook>,
    hook_frequency: u64,
    in_hook: bool,
}

impl MemStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Installs (or clears) the stats hook; `frequency` of 0 disables it.
    /// The hook fires after every `frequency`-th allocate-or-free.
    pub fn set_hook(&mut self, hook: Option<StatsHook>, frequency: u64) {
        self.hook = hook;
        self.hook_frequency = frequency;
    }

    pub(crate) fn record_alloc(&mut self, requested: usize, granted: usize) {
        self.total_allocs += 1;
        self.requested_bytes += requested as u64;
        self.granted_bytes += granted as u64;
        let live = self.total_allocs - self.total_frees;
        if live > self.peak_allocs {
            self.peak_allocs = live;
        }
        let live_bytes = self.granted_bytes - self.freed_bytes;
        if live_bytes > self.peak_granted_bytes {
            self.peak_granted_bytes = live_bytes;
        }
        self.fire_hook();
    }

    pub(crate) fn record_free(&mut self, granted: usize) {
        self.total_frees += 1;
        self.freed_bytes += granted as u64;
        self.fire_hook();
    }

    /// Granted bytes currently live, the value checked against the heap budget
    pub(crate) fn live_granted_bytes(&self) -> u64 {
        self.granted_bytes - self.freed_bytes
    }

    /// Copies the counters out
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_allocs: self.total_allocs,
            total_frees: self.total_frees,
            live_allocs: self.total_allocs - self.total_frees,
            peak_allocs: self.peak_allocs,
            requested_bytes: self.requested_bytes,
            granted_bytes: self.granted_bytes,
            freed_bytes: self.freed_bytes,
            live_granted_bytes: self.granted_bytes - self.freed_bytes,
            peak_granted_bytes: self.peak_granted_bytes,
        }
    }

    fn fire_hook(&mut self) {
        if self.hook_frequency == 0 || self.in_hook {
            return;
        }
        if (self.total_allocs + self.total_frees) % self.hook_frequency != 0 {
            return;
        }
        if let Some(mut hook) = self.hook.take() {
            self.in_hook = true;
            let snap = self.snapshot();
            hook(&snap);
            self.in_hook = false;
            self.hook = Some(hook);
        }
    }
}
