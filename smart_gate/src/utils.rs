use std::time::{Duration, Instant};

/// Keeps a loop at a fixed tick: `wait` sleeps for whatever is left of the
/// tick since the previous call.
pub struct LoopPacer {
    tick_start: Instant,
    tick: Duration,
}

impl LoopPacer {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick_start: Instant::now(),
            tick,
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn remaining(&self) -> Duration {
        self.tick.saturating_sub(self.tick_start.elapsed())
    }

    pub fn wait(&mut self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            spin_sleep::sleep(remaining);
        }
        self.tick_start = Instant::now();
    }

    /// Starts a new tick without sleeping, after time was spent elsewhere.
    pub fn reset(&mut self) {
        self.tick_start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_fills_the_tick() {
        let mut pacer = LoopPacer::new(Duration::from_millis(20));
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_no_sleep_when_tick_already_spent() {
        let mut pacer = LoopPacer::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(pacer.remaining().is_zero());
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
