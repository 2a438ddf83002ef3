use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::plate_number::PlateNumber;

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_RETENTION_FACTOR: u32 = 4;

/// In-memory per-plate rate limiter on pipeline work.
///
/// A plate is eligible when more than `interval` has passed since it was last
/// marked. Unseen plates are always eligible. The map is bounded: entries older
/// than `retention` are swept at most once per interval, and when the map is
/// full the oldest entry goes first.
pub struct DedupTracker {
    interval: Duration,
    retention: Duration,
    capacity: usize,
    last_processed: HashMap<PlateNumber, Instant>,
    next_sweep: Option<Instant>,
}

impl DedupTracker {
    pub fn new(interval: Duration) -> Self {
        Self::with_bounds(interval, DEFAULT_CAPACITY, DEFAULT_RETENTION_FACTOR)
    }

    pub fn with_bounds(interval: Duration, capacity: usize, retention_factor: u32) -> Self {
        let retention = interval
            .checked_mul(retention_factor.max(1))
            .unwrap_or(Duration::MAX);
        Self {
            interval,
            retention,
            capacity: capacity.max(1),
            last_processed: HashMap::new(),
            next_sweep: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.last_processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_processed.is_empty()
    }

    pub fn should_process(&self, plate: &PlateNumber, now: Instant) -> bool {
        match self.last_processed.get(plate) {
            Some(last) => now.saturating_duration_since(*last) > self.interval,
            None => true,
        }
    }

    pub fn mark_processed(&mut self, plate: &PlateNumber, now: Instant) {
        if self.next_sweep.map_or(true, |at| now >= at) {
            self.evict_expired(now);
            self.next_sweep = now.checked_add(self.interval);
        }

        if !self.last_processed.contains_key(plate) && self.last_processed.len() >= self.capacity
        {
            self.evict_expired(now);
            if self.last_processed.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        self.last_processed.insert(plate.clone(), now);
    }

    /// Drops entries older than the retention period. Returns how many went.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.last_processed.len();
        let retention = self.retention;
        self.last_processed
            .retain(|_, last| now.saturating_duration_since(*last) <= retention);
        let evicted = before - self.last_processed.len();
        if evicted > 0 {
            debug!("Dedup sweep evicted {evicted} plates");
        }
        evicted
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .last_processed
            .iter()
            .min_by_key(|(_, last)| **last)
            .map(|(plate, _)| plate.clone());
        if let Some(plate) = oldest {
            debug!("Dedup map full, evicting {plate}");
            self.last_processed.remove(&plate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate_number::PlateValidator;

    fn plate(raw: &str) -> PlateNumber {
        PlateValidator::default().parse(raw).unwrap()
    }

    #[test]
    fn test_window_boundaries() {
        let interval = Duration::from_secs(30);
        let mut dedup = DedupTracker::new(interval);
        let p = plate("444BOP02");
        let t0 = Instant::now();

        assert!(dedup.should_process(&p, t0));
        dedup.mark_processed(&p, t0);

        assert!(!dedup.should_process(&p, t0));
        assert!(!dedup.should_process(&p, t0 + Duration::from_millis(1)));
        assert!(!dedup.should_process(&p, t0 + Duration::from_secs(15)));
        assert!(!dedup.should_process(&p, t0 + interval));
        assert!(dedup.should_process(&p, t0 + interval + Duration::from_millis(1)));
    }

    #[test]
    fn test_plates_are_independent() {
        let mut dedup = DedupTracker::new(Duration::from_secs(30));
        let t0 = Instant::now();
        dedup.mark_processed(&plate("444BOP02"), t0);
        assert!(dedup.should_process(&plate("777XYZ11"), t0));
    }

    #[test]
    fn test_remark_restarts_window() {
        let interval = Duration::from_secs(10);
        let mut dedup = DedupTracker::new(interval);
        let p = plate("444BOP02");
        let t0 = Instant::now();
        dedup.mark_processed(&p, t0);
        let t1 = t0 + Duration::from_secs(11);
        assert!(dedup.should_process(&p, t1));
        dedup.mark_processed(&p, t1);
        assert!(!dedup.should_process(&p, t1 + Duration::from_secs(5)));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut dedup = DedupTracker::with_bounds(Duration::from_secs(30), 2, 4);
        let t0 = Instant::now();
        let a = plate("111AAA11");
        let b = plate("222BBB22");
        let c = plate("333CCC33");

        dedup.mark_processed(&a, t0);
        dedup.mark_processed(&b, t0 + Duration::from_secs(1));
        dedup.mark_processed(&c, t0 + Duration::from_secs(2));

        assert_eq!(dedup.len(), 2);
        assert!(dedup.should_process(&a, t0 + Duration::from_secs(2)));
        assert!(!dedup.should_process(&b, t0 + Duration::from_secs(2)));
        assert!(!dedup.should_process(&c, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_sweep_drops_stale_entries() {
        let interval = Duration::from_secs(10);
        let mut dedup = DedupTracker::with_bounds(interval, 100, 2);
        let t0 = Instant::now();
        dedup.mark_processed(&plate("111AAA11"), t0);
        dedup.mark_processed(&plate("222BBB22"), t0 + Duration::from_secs(5));

        // Past the sweep deadline; the first plate is older than 2 x interval.
        dedup.mark_processed(&plate("333CCC33"), t0 + Duration::from_secs(21));
        assert_eq!(dedup.len(), 2);
        assert_eq!(dedup.evict_expired(t0 + Duration::from_secs(100)), 2);
        assert!(dedup.is_empty());
    }
}
