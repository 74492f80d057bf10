//! Rolling outcome bitmap backing the per-event debouncer.
//!
//! Bit 0 is the most recent outcome (0 = succeeded/unchanged, 1 = failed/changed).
//! Posting shifts left and sets the low bit from the new outcome. The shift is
//! an unsigned 64-bit shift and is allowed to overflow into (what would be,
//! signed) the sign bit by design — see spec §9 "Event bitmap shift".

/// A 64-cycle rolling history of pass/fail outcomes for one (Service, rule-kind,
/// ActionBinding) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct RollingBitmap(u64);

impl RollingBitmap {
    pub fn new() -> Self {
        Self(0)
    }

    /// A bitmap that is entirely the given class, used to reset after a transition.
    pub fn constant(failed: bool) -> Self {
        Self(if failed { u64::MAX } else { 0 })
    }

    /// Record one more outcome. `failed` true means the posted outcome belongs
    /// to the "failed/changed" class.
    pub fn push(&mut self, failed: bool) {
        self.0 = (self.0 << 1) | (failed as u64);
    }

    /// Count how many of the oldest `cycles` bits equal `failed`.
    pub fn count_in_window(&self, cycles: u32, failed: bool) -> u32 {
        let cycles = cycles.min(64);
        if cycles == 0 {
            return 0;
        }
        let mask: u64 = if cycles == 64 { u64::MAX } else { (1u64 << cycles) - 1 };
        let window = self.0 & mask;
        let ones = window.count_ones();
        if failed {
            ones
        } else {
            cycles - ones
        }
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_shifts_and_sets_low_bit() {
        let mut b = RollingBitmap::new();
        b.push(true);
        assert_eq!(b.raw(), 0b1);
        b.push(false);
        assert_eq!(b.raw(), 0b10);
        b.push(true);
        assert_eq!(b.raw(), 0b101);
    }

    #[test]
    fn count_in_window_matches_spec_debounce_scenario() {
        // cycles=3, count=2: cycle1 fail, cycle2 fail, cycle3 fail, cycle4 succeed, cycle5 succeed
        let mut b = RollingBitmap::new();
        b.push(true);
        assert_eq!(b.count_in_window(3, true), 1);
        b.push(true);
        assert_eq!(b.count_in_window(3, true), 2); // transition to Failed here
        b.push(true);
        assert_eq!(b.count_in_window(3, true), 3);
        b.push(false);
        assert_eq!(b.count_in_window(3, true), 2); // still Failed (2 of last 3 still fail)
        b.push(false);
        assert_eq!(b.count_in_window(3, true), 1); // now below threshold -> Succeeded
    }

    #[test]
    fn constant_resets_to_pure_class() {
        let b = RollingBitmap::constant(true);
        assert_eq!(b.count_in_window(5, true), 5);
        let b = RollingBitmap::constant(false);
        assert_eq!(b.count_in_window(5, true), 0);
    }

    proptest::proptest! {
        #[test]
        fn window_count_never_exceeds_window_size(pushes in proptest::collection::vec(proptest::bool::ANY, 0..200), cycles in 1u32..64) {
            let mut b = RollingBitmap::new();
            for p in pushes {
                b.push(p);
            }
            let failed_count = b.count_in_window(cycles, true);
            let ok_count = b.count_in_window(cycles, false);
            proptest::prop_assert_eq!(failed_count + ok_count, cycles);
        }
    }
}
