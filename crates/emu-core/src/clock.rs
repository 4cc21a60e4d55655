//! Master clock arithmetic.

/// A point on the shared logical clock, measured in master clock cycles.
pub type Cycle = u32;

/// Sentinel meaning "this event will not happen".
pub const CYCLE_NEVER: Cycle = u32::MAX;

/// Round `cycle` up to the next edge of a clock divided by `divider`.
#[must_use]
pub const fn align_up(cycle: Cycle, divider: u32) -> Cycle {
    cycle.div_ceil(divider) * divider
}

/// The earlier of two event cycles, treating [`CYCLE_NEVER`] as infinitely far.
#[must_use]
pub const fn earliest(a: Cycle, b: Cycle) -> Cycle {
    if a < b { a } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_divider() {
        assert_eq!(align_up(0, 7), 0);
        assert_eq!(align_up(1, 7), 7);
        assert_eq!(align_up(14, 7), 14);
        assert_eq!(align_up(15, 7), 21);
    }

    #[test]
    fn never_loses_to_everything() {
        assert_eq!(earliest(CYCLE_NEVER, 100), 100);
        assert_eq!(earliest(5, CYCLE_NEVER), 5);
        assert_eq!(earliest(CYCLE_NEVER, CYCLE_NEVER), CYCLE_NEVER);
    }
}
