//! Period identifier calculation.
//!
//! Each aggregation granularity has its own balance table and a canonical
//! string key per period: `YYYY-MM-DD`, `YYYY-Www` (ISO week), `YYYY-MM`,
//! `YYYY-QN`, `YYYY-HN`, `YYYY`. Keys sort chronologically as strings, which
//! the cascade relies on.

use chrono::{Datelike, Months, NaiveDate};

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
        Granularity::Quarterly,
        Granularity::Semiannual,
        Granularity::Annual,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Semiannual => "semiannual",
            Granularity::Annual => "annual",
        }
    }

    /// Balance table backing this granularity.
    pub fn table(self) -> &'static str {
        match self {
            Granularity::Daily => "daily_cash_bank_balance",
            Granularity::Weekly => "weekly_cash_bank_balance",
            Granularity::Monthly => "monthly_cash_bank_balance",
            Granularity::Quarterly => "quarterly_cash_bank_balance",
            Granularity::Semiannual => "semiannual_cash_bank_balance",
            Granularity::Annual => "annual_cash_bank_balance",
        }
    }

    /// Name of the period column in the backing table.
    pub fn period_column(self) -> &'static str {
        match self {
            Granularity::Daily => "date",
            Granularity::Weekly => "year_week",
            Granularity::Monthly => "year_month",
            Granularity::Quarterly => "year_quarter",
            Granularity::Semiannual => "year_half",
            Granularity::Annual => "year",
        }
    }

    /// Canonical period key for a calendar date.
    pub fn period_key(self, date: NaiveDate) -> String {
        match self {
            Granularity::Daily => date.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Monthly => date.format("%Y-%m").to_string(),
            Granularity::Quarterly => {
                format!("{}-Q{}", date.year(), (date.month() - 1) / 3 + 1)
            }
            Granularity::Semiannual => {
                format!("{}-H{}", date.year(), (date.month() - 1) / 6 + 1)
            }
            Granularity::Annual => date.format("%Y").to_string(),
        }
    }

    /// Inverse of [`period_key`] for the granularities the cascade steps
    /// through (monthly, quarterly, annual). Returns the first day of the
    /// period.
    pub fn parse_period_key(self, key: &str) -> Result<NaiveDate, LedgerError> {
        let malformed = || LedgerError::MalformedPeriodKey {
            key: key.to_string(),
            granularity: self.name(),
        };

        match self {
            Granularity::Monthly => {
                let (year, month) = key.split_once('-').ok_or_else(malformed)?;
                if year.len() != 4 || month.len() != 2 {
                    return Err(malformed());
                }
                let year: i32 = year.parse().map_err(|_| malformed())?;
                let month: u32 = month.parse().map_err(|_| malformed())?;
                NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(malformed)
            }
            Granularity::Quarterly => {
                let (year, quarter) = key.split_once("-Q").ok_or_else(malformed)?;
                if year.len() != 4 || quarter.len() != 1 {
                    return Err(malformed());
                }
                let year: i32 = year.parse().map_err(|_| malformed())?;
                let quarter: u32 = quarter.parse().map_err(|_| malformed())?;
                if !(1..=4).contains(&quarter) {
                    return Err(malformed());
                }
                NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1).ok_or_else(malformed)
            }
            Granularity::Annual => {
                if key.len() != 4 {
                    return Err(malformed());
                }
                let year: i32 = key.parse().map_err(|_| malformed())?;
                NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(malformed)
            }
            _ => Err(malformed()),
        }
    }

    /// Number of months one period spans, for the granularities that can be
    /// stepped through. `None` for daily/weekly/semiannual, which have no
    /// forward walk.
    fn months_per_period(self) -> Option<u32> {
        match self {
            Granularity::Monthly => Some(1),
            Granularity::Quarterly => Some(3),
            Granularity::Annual => Some(12),
            _ => None,
        }
    }

    /// Step a date `n` periods forward.
    pub fn advance(self, date: NaiveDate, n: u32) -> Option<NaiveDate> {
        let months = self.months_per_period()?;
        date.checked_add_months(Months::new(months * n))
    }

    /// Step a date one period back.
    pub fn step_back(self, date: NaiveDate) -> Option<NaiveDate> {
        let months = self.months_per_period()?;
        date.checked_sub_months(Months::new(months))
    }
}

/// Keys of the `duration` consecutive months covered by a bill starting at
/// `start_date`.
pub fn covered_months(start_date: NaiveDate, duration: u32) -> Vec<String> {
    (0..duration)
        .filter_map(|i| start_date.checked_add_months(Months::new(i)))
        .map(|date| Granularity::Monthly.period_key(date))
        .collect()
}

/// Parse a stored `YYYY-MM-DD` date, tolerating a trailing time component.
pub fn parse_stored_date(value: &str) -> Result<NaiveDate, LedgerError> {
    let prefix = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map_err(|_| LedgerError::validation(format!("invalid date '{}'", value)))
}
