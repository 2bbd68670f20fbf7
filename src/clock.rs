use chrono::{Days, Local, NaiveDate};

/// Source of the current calendar date.
///
/// Production reads the local wall clock; tests pin a fixed date so the
/// "yesterday" cutoff is deterministic.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Latest session considered closed
    fn yesterday(&self) -> NaiveDate {
        let today = self.today();
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }
}
