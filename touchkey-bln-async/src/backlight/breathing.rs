use crate::config::BreathingStep;

/// Position inside a breathing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreathingCursor {
    step: usize,
    idx: u32,
}

impl BreathingCursor {
    pub const fn new() -> Self {
        Self { step: 0, idx: 0 }
    }

    /// Back to the first update of the first step.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Index of the step currently playing.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Returns the next voltage and the delay before the update after it.
    ///
    /// Each update moves `step_mv` from `start_mv` towards `end_mv`. Once the
    /// end would be overshot the cursor moves to the next step, wrapping
    /// around at the end of the table, and restarts at its `start_mv`.
    pub fn advance(&mut self, steps: &[BreathingStep]) -> (u32, u32) {
        let Some(first) = steps.first() else {
            return (BreathingStep::STEADY.start_mv, BreathingStep::STEADY.period_ms);
        };
        if self.step >= steps.len() {
            self.step = 0;
            self.idx = 0;
        }

        let current = steps[self.step];
        let delta = i64::from(self.idx) * i64::from(current.step_mv);
        self.idx = self.idx.saturating_add(1);
        let start = i64::from(current.start_mv);
        let end = i64::from(current.end_mv);
        let (value, overshot) = if current.start_mv <= current.end_mv {
            (start + delta, start + delta > end)
        } else {
            (start - delta, start - delta < end)
        };

        if overshot {
            self.idx = 0;
            self.step += 1;
            if self.step >= steps.len() {
                self.step = 0;
            }
            let next = steps.get(self.step).unwrap_or(first);
            return (next.start_mv, next.period_ms);
        }

        // `value` lies between start and end, both of which fit in a u32.
        (value as u32, current.period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(start_mv: u32, end_mv: u32, period_ms: u32, step_mv: u32) -> BreathingStep {
        BreathingStep {
            start_mv,
            end_mv,
            period_ms,
            step_mv,
        }
    }

    #[test]
    fn steady_step_holds_its_voltage() {
        let mut cursor = BreathingCursor::new();
        for _ in 0..50 {
            assert_eq!(cursor.advance(&[BreathingStep::STEADY]), (3000, 1000));
        }
    }

    #[test]
    fn rising_then_falling_wraps_around() {
        let table = [step(2500, 2700, 10, 100), step(2700, 2500, 20, 100)];
        let mut cursor = BreathingCursor::new();
        let got: heapless::Vec<(u32, u32), 16> =
            (0..10).map(|_| cursor.advance(&table)).collect();
        assert_eq!(
            got.as_slice(),
            &[
                (2500, 10),
                (2600, 10),
                (2700, 10),
                // Overshoot, second step starts.
                (2700, 20),
                (2700, 20),
                (2600, 20),
                (2500, 20),
                // Overshoot, wraps to the first step.
                (2500, 10),
                (2500, 10),
                (2600, 10),
            ]
        );
    }

    #[test]
    fn shrinking_table_restarts_the_cursor() {
        let table = [step(2500, 2600, 10, 100), step(2600, 2500, 10, 100)];
        let mut cursor = BreathingCursor::new();
        for _ in 0..3 {
            cursor.advance(&table);
        }
        assert_eq!(cursor.step(), 1);
        assert_eq!(cursor.advance(&[BreathingStep::STEADY]), (3000, 1000));
        assert_eq!(cursor.step(), 0);
    }
}
