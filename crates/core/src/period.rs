use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive calendar date range used to filter a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    /// Builds a range, swapping the bounds if they were given backwards.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            DateRange { start, end }
        } else {
            DateRange { start: end, end: start }
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn month(month: YearMonth) -> Self {
        DateRange { start: month.first_day(), end: month.last_day() }
    }
}

/// Dates selected for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Range(DateRange),
    /// Any of these calendar months; need not be adjacent.
    Months(Vec<YearMonth>),
}

impl Period {
    /// Sorted and deduplicated month selection.
    pub fn months<I: IntoIterator<Item = YearMonth>>(months: I) -> Self {
        let mut months: Vec<YearMonth> = months.into_iter().collect();
        months.sort_unstable();
        months.dedup();
        Period::Months(months)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            Period::Range(range) => range.contains(date),
            Period::Months(months) => months.binary_search(&YearMonth::of(date)).is_ok(),
        }
    }

    /// Whether any selected date falls in `start..=end`.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match self {
            Period::Range(range) => range.start <= end && start <= range.end,
            Period::Months(months) => months
                .iter()
                .any(|m| m.first_day() <= end && start <= m.last_day()),
        }
    }

    /// Smallest range holding every selected date. `None` for an empty month set.
    pub fn bounds(&self) -> Option<DateRange> {
        match self {
            Period::Range(range) => Some(*range),
            Period::Months(months) => {
                let (first, last) = (months.first()?, months.last()?);
                Some(DateRange::new(first.first_day(), last.last_day()))
            }
        }
    }
}

impl From<DateRange> for Period {
    fn from(range: DateRange) -> Self {
        Period::Range(range)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Range(range) => write!(f, "{range}"),
            Period::Months(months) => {
                for (i, month) in months.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{month}")?;
                }
                Ok(())
            }
        }
    }
}

/// A calendar month, the unit of the month filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        YearMonth { year: date.year(), month: date.month() }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.next().first_day() - Duration::days(1)
    }

    pub fn next(self) -> Self {
        if self.month >= 12 {
            YearMonth { year: self.year + 1, month: 1 }
        } else {
            YearMonth { year: self.year, month: self.month + 1 }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day().format("%B %Y"))
    }
}

impl std::str::FromStr for YearMonth {
    type Err = String;

    /// Accepts `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid month '{s}', expected YYYY-MM"))?;
        let year: i32 = y.parse().map_err(|_| format!("Invalid year in '{s}'"))?;
        let month: u32 = m.parse().map_err(|_| format!("Invalid month in '{s}'"))?;
        if y.len() != 4 || !(1..=12).contains(&month) {
            return Err(format!("Invalid month '{s}', expected YYYY-MM"));
        }
        Ok(YearMonth { year, month })
    }
}

/// Bucket width for time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// ISO weeks, Monday first.
    Week,
    #[default]
    Month,
}

impl Granularity {
    /// First day of the bucket holding `date`.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => YearMonth::of(date).first_day(),
        }
    }

    /// First day of the bucket following the one that starts at `start`.
    pub fn next_bucket(self, start: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => start + Duration::days(1),
            Granularity::Week => start + Duration::days(7),
            Granularity::Month => YearMonth::of(start).next().first_day(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            other => Err(format!("Unknown granularity: '{other}'")),
        }
    }
}
