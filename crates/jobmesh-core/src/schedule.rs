//! Cron schedule parsing and next occurrence calculation.
//!
//! Accepts standard 5-field (`minute hour day month weekday`) and 6-field
//! (`second minute hour day month weekday`) expressions, evaluated in an
//! IANA timezone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::SchedulerError;

/// A parsed cron expression bound to a timezone.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    schedule: Schedule,
}

impl CronSchedule {
    /// Parse `expression` for evaluation in `timezone`.
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, SchedulerError> {
        let timezone = parse_timezone(timezone)?;
        let schedule = parse_expression(expression)?;

        Ok(Self {
            expression: expression.trim().to_string(),
            timezone,
            schedule,
        })
    }

    /// The expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The timezone the expression is evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Next occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Next occurrence from now.
    pub fn next(&self) -> Option<DateTime<Utc>> {
        self.next_after(Utc::now())
    }

    /// The next `n` occurrences after `after`.
    pub fn upcoming_after(&self, after: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .take(n)
            .map(|dt| dt.with_timezone(&Utc))
            .collect()
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronSchedule")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone.name())
            .finish()
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(timezone: &str) -> Result<Tz, SchedulerError> {
    Tz::from_str(timezone.trim()).map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))
}

/// Check that `expression` is a valid 5- or 6-field cron expression.
pub fn validate_cron_expression(expression: &str) -> Result<(), SchedulerError> {
    parse_expression(expression).map(|_| ())
}

fn parse_expression(expression: &str) -> Result<Schedule, SchedulerError> {
    let trimmed = expression.trim();
    let fields = trimmed.split_whitespace().count();

    // The cron crate wants seconds first and also accepts a trailing year;
    // only 5 and 6 fields are allowed here.
    let normalized = match fields {
        5 => format!("0 {}", trimmed),
        6 => trimmed.to_string(),
        n => {
            return Err(SchedulerError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("expected 5 or 6 fields, got {}", n),
            });
        }
    };

    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}
