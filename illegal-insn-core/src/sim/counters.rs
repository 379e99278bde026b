use std::sync::atomic::{AtomicU64, Ordering};

use crate::hart::{FirmwareCounters, FirmwareEvent};

/// Per-hart firmware event counters, as exposed through the SBI PMU extension.
///
/// Increments are relaxed atomics, so a shared reference is enough to count from trap context.
#[derive(Debug, Default)]
pub struct EventCounters {
    counts: [AtomicU64; FirmwareEvent::COUNT],
}

impl EventCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event: FirmwareEvent) -> u64 {
        self.counts[event.code()].load(Ordering::Relaxed)
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}

impl FirmwareCounters for EventCounters {
    fn increment(&self, event: FirmwareEvent) {
        self.counts[event.code()].fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment() {
        let counters = EventCounters::new();
        counters.increment(FirmwareEvent::IllegalInsn);
        counters.increment(FirmwareEvent::IllegalInsn);
        counters.increment(FirmwareEvent::SetTimer);
        assert_eq!(2, counters.get(FirmwareEvent::IllegalInsn));
        assert_eq!(1, counters.get(FirmwareEvent::SetTimer));
        assert_eq!(0, counters.get(FirmwareEvent::MisalignedLoad));
        counters.reset();
        assert_eq!(0, counters.get(FirmwareEvent::IllegalInsn));
    }
}
