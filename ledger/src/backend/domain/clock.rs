use chrono::{Local, NaiveDate};

/// Source of "today" for everything date-dependent
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a single date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }
}
