use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::date_util::{format_instant, parse_instant, span_days};
use crate::error::{Error, Result};

/// Years whose timestamps keep the fixed-width storage format.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// An inclusive window `[start, end]` of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidParameter(format!(
                "startDate ({}) must not be after endDate ({})",
                format_instant(&start),
                format_instant(&end)
            )));
        }
        for (name, dt) in [("startDate", &start), ("endDate", &end)] {
            if !STORABLE_YEARS.contains(&dt.year()) {
                return Err(Error::InvalidParameter(format!(
                    "{name} must fall between years 0000 and 9999"
                )));
            }
        }

        let range = Self { start, end };
        match range.previous_start() {
            Some(prev) if STORABLE_YEARS.contains(&prev.year()) => Ok(range),
            _ => Err(Error::InvalidParameter(format!(
                "the window before {} is earlier than year 0000",
                format_instant(&start)
            ))),
        }
    }

    /// Build a range from the raw `startDate`/`endDate` query values.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_instant("startDate", start)?;
        let end = parse_instant("endDate", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The window of identical duration ending 1ms before this one starts.
    ///
    /// Saturates at `DateTime::MIN_UTC`; ranges built through [`DateRange::new`]
    /// never get there.
    pub fn previous(&self) -> Self {
        let end = self
            .start
            .checked_sub_signed(Duration::milliseconds(1))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let start = self.previous_start().unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    fn previous_start(&self) -> Option<DateTime<Utc>> {
        self.start
            .checked_sub_signed(Duration::milliseconds(1))?
            .checked_sub_signed(self.duration())
    }

    /// Length in fractional days.
    pub fn span_days(&self) -> f64 {
        span_days(&self.start, &self.end)
    }

    pub fn to_window(&self) -> Window {
        Window {
            start: format_instant(&self.start),
            end: format_instant(&self.end),
        }
    }
}

/// Serialized form of a [`DateRange`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: String,
    pub end: String,
}

/// Coarse label for a comparison window, used for display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Custom,
}

impl PeriodType {
    /// Classify a range by its span: `<= 1` day daily, `<= 7` weekly,
    /// `<= 31` monthly, `<= 92` quarterly, anything longer yearly.
    pub fn classify(range: &DateRange) -> Self {
        let days = range.span_days();
        if days <= 1.0 {
            PeriodType::Daily
        } else if days <= 7.0 {
            PeriodType::Weekly
        } else if days <= 31.0 {
            PeriodType::Monthly
        } else if days <= 92.0 {
            PeriodType::Quarterly
        } else {
            PeriodType::Yearly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Yearly => "yearly",
            PeriodType::Custom => "custom",
        }
    }

    /// Widget caption, e.g. "vs last month".
    pub fn comparison_label(&self) -> &'static str {
        match self {
            PeriodType::Daily => "vs yesterday",
            PeriodType::Weekly => "vs last week",
            PeriodType::Monthly => "vs last month",
            PeriodType::Quarterly => "vs last quarter",
            PeriodType::Yearly => "vs last year",
            PeriodType::Custom => "vs previous period",
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn days(n: i64) -> DateRange {
        let start = utc(2024, 1, 1);
        DateRange::new(start, start + Duration::days(n)).unwrap()
    }

    #[test]
    fn test_previous_has_same_duration_and_precedes() {
        for range in [
            days(1),
            days(7),
            days(30),
            DateRange::parse("2024-02-10T08:15:00Z", "2024-02-10T08:15:00.001Z").unwrap(),
            DateRange::parse("2023-06-01", "2024-06-01").unwrap(),
        ] {
            let prev = range.previous();
            assert_eq!(prev.duration(), range.duration());
            assert!(prev.end() < range.start());
            assert_eq!(range.start() - prev.end(), Duration::milliseconds(1));
        }
    }

    #[test]
    fn test_previous_of_january() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let prev = range.previous();
        assert_eq!(prev.to_window().end, "2023-12-31T23:59:59.999Z");
        assert_eq!(prev.to_window().start, "2023-12-01T23:59:59.999Z");
    }

    #[test]
    fn test_zero_length_range() {
        let t = utc(2024, 5, 5);
        let range = DateRange::new(t, t).unwrap();
        let prev = range.previous();
        assert_eq!(prev.start(), prev.end());
        assert_eq!(prev.end(), t - Duration::milliseconds(1));
        assert_eq!(PeriodType::classify(&range), PeriodType::Daily);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = DateRange::parse("2024-02-01", "2024-01-01").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_out_of_range_years_rejected() {
        for (start, end) in [
            ("-262143-01-01", "2024-01-31"),
            ("-0001-12-31", "2024-01-31"),
            ("2024-01-01", "+10000-01-01"),
        ] {
            let err = DateRange::parse(start, end).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter(_)), "{start}..{end}");
        }
    }

    #[test]
    fn test_previous_window_before_year_zero_rejected() {
        let err = DateRange::parse("0001-01-01", "0002-06-01").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));

        let range = DateRange::parse("0001-01-01", "0001-06-01").unwrap();
        assert_eq!(range.previous().to_window().start, "0000-08-02T23:59:59.999Z");
    }

    #[test]
    fn test_classify() {
        assert_eq!(PeriodType::classify(&days(1)), PeriodType::Daily);
        assert_eq!(PeriodType::classify(&days(2)), PeriodType::Weekly);
        assert_eq!(PeriodType::classify(&days(7)), PeriodType::Weekly);
        assert_eq!(PeriodType::classify(&days(8)), PeriodType::Monthly);
        assert_eq!(PeriodType::classify(&days(31)), PeriodType::Monthly);
        assert_eq!(PeriodType::classify(&days(32)), PeriodType::Quarterly);
        assert_eq!(PeriodType::classify(&days(92)), PeriodType::Quarterly);
        assert_eq!(PeriodType::classify(&days(93)), PeriodType::Yearly);
        assert_eq!(PeriodType::classify(&days(400)), PeriodType::Yearly);
    }

    #[test]
    fn test_classify_just_over_a_day() {
        let range = DateRange::parse("2024-01-01T00:00:00Z", "2024-01-02T00:00:00.001Z").unwrap();
        assert_eq!(PeriodType::classify(&range), PeriodType::Weekly);
    }

    #[test]
    fn test_display() {
        assert_eq!(PeriodType::Quarterly.to_string(), "quarterly");
    }

    #[test]
    fn test_comparison_label() {
        assert_eq!(PeriodType::Monthly.comparison_label(), "vs last month");
        assert_eq!(PeriodType::Custom.comparison_label(), "vs previous period");
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&PeriodType::Weekly).unwrap(),
            "\"weekly\""
        );
    }
}
