use anyhow::{bail, Context};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A calendar month, e.g. `2024-03`. This is the key of a monthly budget record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    /// Always the first day of the month.
    first: NaiveDate,
}

impl YearMonth {
    /// Creates a `YearMonth`. `month` is 1-based.
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .with_context(|| format!("Invalid year and month: {year}-{month}"))?;
        Ok(Self { first })
    }

    /// The month that contains `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            first: date.with_day(1).unwrap_or(date),
        }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    /// 1-based month number.
    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// The month `n` months before this one. Crosses year boundaries.
    pub fn minus(&self, n: u32) -> Self {
        Self {
            first: self
                .first
                .checked_sub_months(Months::new(n))
                .unwrap_or(NaiveDate::MIN),
        }
    }

    /// The month before this one.
    pub fn prev(&self) -> Self {
        self.minus(1)
    }

    /// The month after this one.
    pub fn next(&self) -> Self {
        Self {
            first: self
                .first
                .checked_add_months(Months::new(1))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::from_date(date) == *self
    }

    /// Every day of the month in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first.iter_days().take_while(move |d| *d <= last)
    }

    /// A human readable label like `March 2024`.
    pub fn label(&self) -> String {
        self.first.format("%B %Y").to_string()
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((year, month)) = s.trim().split_once('-') else {
            bail!("Expected a month formatted as YYYY-MM but got '{s}'");
        };
        let year: i32 = year
            .parse()
            .with_context(|| format!("Invalid year in '{s}'"))?;
        let month: u32 = month
            .parse()
            .with_context(|| format!("Invalid month in '{s}'"))?;
        YearMonth::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        YearMonth::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        YearMonth::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(ym("2024-03").to_string(), "2024-03");
        assert_eq!(ym("2024-3").to_string(), "2024-03");
        assert!(YearMonth::from_str("2024-13").is_err());
        assert!(YearMonth::from_str("202403").is_err());
    }

    #[test]
    fn test_first_and_last_day() {
        assert_eq!(ym("2024-02").first_day(), date("2024-02-01"));
        assert_eq!(ym("2024-02").last_day(), date("2024-02-29"));
        assert_eq!(ym("2023-02").last_day(), date("2023-02-28"));
        assert_eq!(ym("2024-12").last_day(), date("2024-12-31"));
    }

    #[test]
    fn test_minus_crosses_year_boundary() {
        assert_eq!(ym("2024-01").minus(2), ym("2023-11"));
        assert_eq!(ym("2024-01").prev(), ym("2023-12"));
        assert_eq!(ym("2024-03").minus(2), ym("2024-01"));
        assert_eq!(ym("2023-12").next(), ym("2024-01"));
    }

    #[test]
    fn test_days() {
        let days: Vec<NaiveDate> = ym("2024-02").days().collect();
        assert_eq!(days.len(), 29);
        assert_eq!(days[0], date("2024-02-01"));
        assert_eq!(days[28], date("2024-02-29"));
    }

    #[test]
    fn test_contains_and_label() {
        assert!(ym("2024-03").contains(date("2024-03-31")));
        assert!(!ym("2024-03").contains(date("2024-04-01")));
        assert_eq!(ym("2024-03").label(), "March 2024");
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&ym("2024-03")).unwrap();
        assert_eq!(json, "\"2024-03\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ym("2024-03"));
    }
}
