//! Time source for window and calendar logic.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn now_local(&self) -> DateTime<Local>;

    /// Calendar date that trailing windows end on.
    fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Hand-driven clock for tests. Clones share the same instant.
///
/// `today()` is the UTC date, so results do not depend on the host timezone.
#[derive(Debug, Clone)]
pub struct MockClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Midnight UTC at the start of `date`.
    pub fn on_date(date: NaiveDate) -> Self {
        Self::new(date.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut instant = self.instant.lock().unwrap_or_else(PoisonError::into_inner);
        *instant += by;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }

    fn today(&self) -> NaiveDate {
        self.now_utc().date_naive()
    }
}
