//! Report periods: explicit bounds or named presets, in the report timezone.

use crate::models::TimeRange;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("cannot read '{0}' as a date; use YYYY-MM-DD, YYYY-MM-DDTHH:MM:SS or unix seconds")]
    Unparsable(String),

    #[error("'{0}' does not exist in the report timezone")]
    NonexistentLocalTime(String),

    #[error("period start is after its end")]
    Reversed,

    #[error("provide either a period or both from and to")]
    Missing,
}

impl From<PeriodError> for AppError {
    fn from(err: PeriodError) -> Self {
        AppError::BadRequest(anyhow::Error::new(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodPreset {
    LastHour,
    Today,
    Yesterday,
    /// Three days back through the end of today.
    Last3,
}

/// A period as requested, before it is resolved against the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSpec {
    Preset(PeriodPreset),
    Explicit {
        from: Option<String>,
        to: Option<String>,
    },
    Range(TimeRange),
}

impl PeriodSpec {
    pub fn resolve(&self, now: DateTime<Utc>, tz: Tz) -> Result<TimeRange, PeriodError> {
        match self {
            Self::Preset(preset) => preset_range(*preset, now, tz),
            Self::Explicit {
                from: Some(from),
                to: Some(to),
            } => explicit_range(from, to, tz),
            Self::Explicit { .. } => Err(PeriodError::Missing),
            Self::Range(range) => Ok(*range),
        }
    }
}

impl From<TimeRange> for PeriodSpec {
    fn from(range: TimeRange) -> Self {
        Self::Range(range)
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn to_unix(tz: Tz, ndt: NaiveDateTime, raw: &str) -> Result<i64, PeriodError> {
    tz.from_local_datetime(&ndt)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| PeriodError::NonexistentLocalTime(raw.to_string()))
}

/// One period bound.
///
/// All digits means unix seconds. Otherwise a local date or date-time; a
/// `to` bound at exactly midnight is read as the end of that day, so
/// `2024-03-01..2024-03-01` covers the whole day.
pub fn parse_bound(value: &str, is_to: bool, tz: Tz) -> Result<i64, PeriodError> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .map_err(|_| PeriodError::Unparsable(value.to_string()));
    }

    let mut ndt = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| PeriodError::Unparsable(value.to_string()))?;

    if is_to && ndt.time() == NaiveTime::MIN {
        ndt = ndt.date().and_time(end_of_day());
    }
    to_unix(tz, ndt, value)
}

pub fn explicit_range(from: &str, to: &str, tz: Tz) -> Result<TimeRange, PeriodError> {
    let range = TimeRange::new(parse_bound(from, false, tz)?, parse_bound(to, true, tz)?);
    if range.from > range.to {
        return Err(PeriodError::Reversed);
    }
    Ok(range)
}

pub fn preset_range(
    preset: PeriodPreset,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<TimeRange, PeriodError> {
    let now_ts = now.timestamp();
    let today = now.with_timezone(&tz).date_naive();
    let whole_days = |first: NaiveDate, last: NaiveDate| -> Result<TimeRange, PeriodError> {
        let from = to_unix(tz, first.and_time(NaiveTime::MIN), &first.to_string())?;
        let to = to_unix(tz, last.and_time(end_of_day()), &last.to_string())?;
        Ok(TimeRange::new(from, to))
    };

    match preset {
        PeriodPreset::LastHour => Ok(TimeRange::new(now_ts - 3600, now_ts)),
        PeriodPreset::Today => whole_days(today, today),
        PeriodPreset::Yesterday => {
            let day = today - Days::new(1);
            whole_days(day, day)
        }
        PeriodPreset::Last3 => whole_days(today - Days::new(3), today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Kyiv;

    #[test]
    fn digits_are_unix_seconds() {
        assert_eq!(parse_bound("1700000000", false, Kyiv), Ok(1_700_000_000));
    }

    #[test]
    fn bare_to_date_means_end_of_day() {
        // Kyiv is UTC+2 in winter.
        let from = parse_bound("2024-01-15", false, Kyiv).unwrap();
        let to = parse_bound("2024-01-15", true, Kyiv).unwrap();
        assert_eq!(from, 1_705_269_600);
        assert_eq!(to - from, 86_399);
    }

    #[test]
    fn explicit_time_is_kept() {
        let ts = parse_bound("2024-01-15T10:30:00", true, Kyiv).unwrap();
        assert_eq!(ts, 1_705_269_600 + 10 * 3600 + 30 * 60);
    }

    #[test]
    fn rejects_garbage_and_reversed_ranges() {
        assert!(matches!(
            parse_bound("next week", false, Kyiv),
            Err(PeriodError::Unparsable(_))
        ));
        assert_eq!(
            explicit_range("2024-02-02", "2024-02-01", Kyiv),
            Err(PeriodError::Reversed)
        );
    }

    #[test]
    fn presets_use_local_days() {
        // 2024-01-15 12:00 Kyiv.
        let now = Utc.timestamp_opt(1_705_269_600 + 12 * 3600, 0).unwrap();

        let today = preset_range(PeriodPreset::Today, now, Kyiv).unwrap();
        assert_eq!(today.from, 1_705_269_600);
        assert_eq!(today.to, 1_705_269_600 + 86_399);

        let yesterday = preset_range(PeriodPreset::Yesterday, now, Kyiv).unwrap();
        assert_eq!(yesterday.to + 1, today.from);

        let last3 = preset_range(PeriodPreset::Last3, now, Kyiv).unwrap();
        assert_eq!(last3.from, today.from - 3 * 86_400);
        assert_eq!(last3.to, today.to);

        let hour = preset_range(PeriodPreset::LastHour, now, Kyiv).unwrap();
        assert_eq!(hour.to - hour.from, 3600);
    }

    #[test]
    fn preset_names() {
        let p: PeriodPreset = serde_json::from_str("\"last3\"").unwrap();
        assert_eq!(p, PeriodPreset::Last3);
        let p: PeriodPreset = serde_json::from_str("\"last_hour\"").unwrap();
        assert_eq!(p, PeriodPreset::LastHour);
    }

    #[test]
    fn incomplete_explicit_period_is_missing() {
        let now = Utc.timestamp_opt(1_705_269_600, 0).unwrap();
        let spec = PeriodSpec::Explicit {
            from: Some("2024-01-01".to_string()),
            to: None,
        };
        assert_eq!(spec.resolve(now, Kyiv), Err(PeriodError::Missing));

        let spec = PeriodSpec::Explicit {
            from: Some(String::new()),
            to: Some("2024-01-02".to_string()),
        };
        assert_eq!(
            spec.resolve(now, Kyiv),
            Err(PeriodError::Unparsable(String::new()))
        );
    }
}
