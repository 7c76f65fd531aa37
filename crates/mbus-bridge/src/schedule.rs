use crate::error::ScheduleError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

/// When a device is polled after its first poll.
#[derive(Debug, Clone)]
pub enum PollSchedule {
    Cron(Box<Schedule>),
    Every(Duration),
}

impl PollSchedule {
    /// Parse a cron expression. Six or seven fields start with seconds; the classic
    /// five-field form is accepted and fires at second zero.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };
        Schedule::from_str(&normalized)
            .map(|s| Self::Cron(Box::new(s)))
            .map_err(|e| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        Ok(Self::Every(interval))
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&now).next(),
            Self::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
        }
    }

    /// Time left until the next fire, or `None` if the schedule never fires again.
    pub fn until_next(&self) -> Option<Duration> {
        if let Self::Every(interval) = self {
            return Some(*interval);
        }
        let now = Utc::now();
        let next = self.next_after(now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_cron_fires_at_second_zero() {
        let schedule = PollSchedule::parse("*/5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 17).unwrap();
        assert_eq!(
            schedule.next_after(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap())
        );
    }

    #[test]
    fn six_field_cron_with_seconds() {
        let schedule = PollSchedule::parse("*/30 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 17).unwrap();
        assert_eq!(
            schedule.next_after(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 30).unwrap())
        );
        let wait = schedule.until_next().unwrap();
        assert!(wait <= Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            PollSchedule::parse("every minute"),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert_eq!(
            PollSchedule::every(Duration::ZERO).unwrap_err(),
            ScheduleError::ZeroInterval
        );
    }

    #[test]
    fn fixed_interval() {
        let schedule = PollSchedule::every(Duration::from_millis(250)).unwrap();
        assert_eq!(schedule.until_next(), Some(Duration::from_millis(250)));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(now),
            Some(now + chrono::Duration::milliseconds(250))
        );
    }
}
