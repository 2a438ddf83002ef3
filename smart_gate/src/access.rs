use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::error::StoreError;
use crate::gate::GateContext;
use crate::plate_number::PlateNumber;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(30);
const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// The slice of the persistence store the decision step depends on.
pub trait ArrivalStore {
    /// Atomically checks for an arrival of `plate` at or after `since` and, when
    /// there is none, records a new one at `at`.
    fn record_arrival_if_absent(
        &self,
        plate: &PlateNumber,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError>;

    fn is_whitelisted(&self, plate: &PlateNumber) -> Result<bool, StoreError>;
}

impl<S: ArrivalStore + ?Sized> ArrivalStore for &S {
    fn record_arrival_if_absent(
        &self,
        plate: &PlateNumber,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        (**self).record_arrival_if_absent(plate, since, at)
    }

    fn is_whitelisted(&self, plate: &PlateNumber) -> Result<bool, StoreError> {
        (**self).is_whitelisted(plate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
    /// The plate arrived within the recency window; nothing was recorded.
    Suppressed,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Granted => "granted",
            Decision::Denied => "denied",
            Decision::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct AccessEngine<S> {
    store: S,
    window: chrono::Duration,
}

impl<S: ArrivalStore> AccessEngine<S> {
    pub fn new(store: S, window: Duration) -> Self {
        let window = chrono::Duration::milliseconds(window.min(MAX_WINDOW).as_millis() as i64);
        Self { store, window }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Logs the arrival unless one was logged within the window and decides
    /// from the whitelist. The whitelist is read before anything is written, so
    /// a failed call leaves no arrival behind and the next sighting is decided
    /// afresh. Store failures are returned to the caller untouched.
    pub fn decide(&self, plate: &PlateNumber, now: DateTime<Utc>) -> Result<Decision, StoreError> {
        let whitelisted = self.store.is_whitelisted(plate)?;

        let since = now - self.window;
        if self
            .store
            .record_arrival_if_absent(plate, since, now)?
            .is_none()
        {
            info!("Plate {plate} arrived within the last {}s, suppressed", self.window.num_seconds());
            return Ok(Decision::Suppressed);
        }

        let decision = if whitelisted {
            Decision::Granted
        } else {
            Decision::Denied
        };
        info!("Access for plate {plate}: {decision}");
        Ok(decision)
    }

    /// [`AccessEngine::decide`] plus the gate transition. On a store failure the
    /// gate is closed, since access cannot be confirmed.
    pub fn decide_and_apply(
        &self,
        plate: &PlateNumber,
        now: DateTime<Utc>,
        context: &mut GateContext,
    ) -> Result<Decision, StoreError> {
        match self.decide(plate, now) {
            Ok(decision) => {
                context.apply_decision(decision);
                Ok(decision)
            }
            Err(err) => {
                warn!("Access decision for {plate} unavailable, closing gate: {err}");
                context.close_gate();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::dedup::DedupTracker;
    use crate::gate::GateState;
    use crate::plate_number::PlateValidator;
    use crate::storage::Database;

    fn plate(raw: &str) -> PlateNumber {
        PlateValidator::default().parse(raw).unwrap()
    }

    fn context() -> GateContext {
        GateContext::new(DedupTracker::new(DEFAULT_DEBOUNCE))
    }

    #[test]
    fn test_whitelisted_plate_is_granted() {
        let db = Database::in_memory().unwrap();
        let p = plate("444BOP02");
        db.insert_whitelist(&p).unwrap();
        let engine = AccessEngine::new(&db, DEFAULT_DEBOUNCE);
        let mut ctx = context();

        let decision = engine.decide_and_apply(&p, Utc::now(), &mut ctx).unwrap();

        assert_eq!(decision, Decision::Granted);
        assert_eq!(db.count_arrivals().unwrap(), 1);
        assert_eq!(ctx.gate_state(), GateState::Open);
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let db = Database::in_memory().unwrap();
        let p = plate("444BOP02");
        db.insert_whitelist(&p).unwrap();
        let engine = AccessEngine::new(&db, DEFAULT_DEBOUNCE);
        let mut ctx = context();
        let t0 = Utc::now();

        engine.decide_and_apply(&p, t0, &mut ctx).unwrap();
        ctx.close_gate();

        let later = t0 + chrono::Duration::seconds(5);
        let decision = engine.decide_and_apply(&p, later, &mut ctx).unwrap();

        assert_eq!(decision, Decision::Suppressed);
        assert_eq!(db.count_arrivals().unwrap(), 1);
        assert_eq!(ctx.gate_state(), GateState::Closed);
    }

    #[test]
    fn test_suppression_leaves_open_gate_open() {
        let db = Database::in_memory().unwrap();
        let p = plate("777XYZ11");
        let t0 = Utc::now();
        db.insert_arrival(&p, t0).unwrap();
        let engine = AccessEngine::new(&db, DEFAULT_DEBOUNCE);
        let mut ctx = context();
        ctx.open_gate();

        let decision = engine
            .decide_and_apply(&p, t0 + chrono::Duration::seconds(1), &mut ctx)
            .unwrap();

        assert_eq!(decision, Decision::Suppressed);
        assert_eq!(db.count_arrivals().unwrap(), 1);
        assert_eq!(ctx.gate_state(), GateState::Open);
    }

    #[test]
    fn test_unknown_plate_is_denied() {
        let db = Database::in_memory().unwrap();
        db.insert_whitelist(&plate("444BOP02")).unwrap();
        let engine = AccessEngine::new(&db, DEFAULT_DEBOUNCE);
        let mut ctx = context();
        ctx.open_gate();

        let decision = engine
            .decide_and_apply(&plate("777XYZ11"), Utc::now(), &mut ctx)
            .unwrap();

        assert_eq!(decision, Decision::Denied);
        assert_eq!(db.count_arrivals().unwrap(), 1);
        assert_eq!(ctx.gate_state(), GateState::Closed);
    }

    #[test]
    fn test_window_expiry_logs_again() {
        let db = Database::in_memory().unwrap();
        let p = plate("777XYZ11");
        let engine = AccessEngine::new(&db, Duration::from_secs(10));
        let t0 = Utc::now();

        assert_eq!(engine.decide(&p, t0).unwrap(), Decision::Denied);
        assert_eq!(
            engine.decide(&p, t0 + chrono::Duration::seconds(10)).unwrap(),
            Decision::Suppressed
        );
        assert_eq!(
            engine.decide(&p, t0 + chrono::Duration::seconds(11)).unwrap(),
            Decision::Denied
        );
        assert_eq!(db.count_arrivals().unwrap(), 2);
    }

    struct BrokenStore {
        calls: Cell<usize>,
    }

    impl ArrivalStore for BrokenStore {
        fn record_arrival_if_absent(
            &self,
            _plate: &PlateNumber,
            _since: DateTime<Utc>,
            _at: DateTime<Utc>,
        ) -> Result<Option<i64>, StoreError> {
            self.calls.set(self.calls.get() + 1);
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }

        fn is_whitelisted(&self, _plate: &PlateNumber) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    #[test]
    fn test_store_failure_closes_gate() {
        let store = BrokenStore {
            calls: Cell::new(0),
        };
        let engine = AccessEngine::new(store, DEFAULT_DEBOUNCE);
        let mut ctx = context();
        ctx.open_gate();

        let result = engine.decide_and_apply(&plate("444BOP02"), Utc::now(), &mut ctx);

        assert!(result.is_err());
        assert_eq!(engine.store().calls.get(), 1);
        assert_eq!(ctx.gate_state(), GateState::Closed);
    }

    /// Real database whose whitelist lookup fails a set number of times.
    struct FlakyWhitelist<'a> {
        db: &'a Database,
        failures_left: Cell<usize>,
    }

    impl ArrivalStore for FlakyWhitelist<'_> {
        fn record_arrival_if_absent(
            &self,
            plate: &PlateNumber,
            since: DateTime<Utc>,
            at: DateTime<Utc>,
        ) -> Result<Option<i64>, StoreError> {
            self.db.record_arrival_if_absent(plate, since, at)
        }

        fn is_whitelisted(&self, plate: &PlateNumber) -> Result<bool, StoreError> {
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            self.db.is_whitelisted(plate)
        }
    }

    #[test]
    fn test_failed_whitelist_read_logs_nothing_and_retry_grants() {
        let db = Database::in_memory().unwrap();
        let p = plate("444BOP02");
        db.insert_whitelist(&p).unwrap();
        let store = FlakyWhitelist {
            db: &db,
            failures_left: Cell::new(1),
        };
        let engine = AccessEngine::new(store, DEFAULT_DEBOUNCE);
        let mut ctx = context();
        let t0 = Utc::now();

        assert!(engine.decide_and_apply(&p, t0, &mut ctx).is_err());
        assert_eq!(db.count_arrivals().unwrap(), 0);
        assert_eq!(ctx.gate_state(), GateState::Closed);

        let retry = engine
            .decide_and_apply(&p, t0 + chrono::Duration::seconds(1), &mut ctx)
            .unwrap();
        assert_eq!(retry, Decision::Granted);
        assert_eq!(db.count_arrivals().unwrap(), 1);
        assert_eq!(ctx.gate_state(), GateState::Open);
    }
}
