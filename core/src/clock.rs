//! Calculation clock — where "now" comes from.
//!
//! Production uses the system clock. Tests and replays pin it so that
//! calculation timestamps and the "today" fallback for unbound dates are
//! reproducible.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalcClock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl CalcClock {
    /// Millisecond precision, matching what the store persists.
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            CalcClock::System   => Utc::now().trunc_subsecs(3),
            CalcClock::Fixed(t) => *t,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
