//! Calendar months and the human-readable month label codec.
//!
//! Months are carried around as a `(year, month)` pair. The `"Enero 2024"`
//! label form only appears where debts are serialized or where a caller
//! hands us free text, so lookups never depend on formatting.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Canonical month names, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

const LABEL_PREPOSITION: &str = "de";

/// Earliest year a month label can name.
pub const MIN_YEAR: i32 = 0;
/// Latest year a month label can name.
pub const MAX_YEAR: i32 = 9999;

/// A calendar month identified by year and month number (1-12). Years stay
/// within [`MIN_YEAR`]..=[`MAX_YEAR`] so every month has a four-digit label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    /// Builds a month, returning `None` when `month` is outside 1-12 or the
    /// year is outside the four-digit range.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((MIN_YEAR..=MAX_YEAR).contains(&year) && (1..=12).contains(&month))
            .then_some(Self { year, month })
    }

    /// Returns the month containing `date`, or `None` for dates outside the
    /// four-digit year range.
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        Self::new(date.year(), date.month())
    }

    /// Like [`BillingMonth::from_date`], saturating at the first or last
    /// representable month.
    pub fn from_date_clamped(date: NaiveDate) -> Self {
        let year = date.year().clamp(MIN_YEAR, MAX_YEAR);
        if year == date.year() {
            Self {
                year,
                month: date.month(),
            }
        } else if year == MIN_YEAR {
            Self { year, month: 1 }
        } else {
            Self { year, month: 12 }
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First calendar day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the month.
    pub fn last_day(&self) -> NaiveDate {
        self.first_day()
            .with_day(self.days_in_month())
            .unwrap_or_else(|| self.first_day())
    }

    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    /// The month after this one, or `None` after December 9999.
    pub fn succ(&self) -> Option<Self> {
        self.add_months(1)
    }

    /// The month before this one, or `None` before January 0000.
    pub fn pred(&self) -> Option<Self> {
        self.add_months(-1)
    }

    /// Shifts the month by `months`, crossing year boundaries as needed.
    /// Returns `None` when the result leaves the four-digit year range.
    pub fn add_months(&self, months: i32) -> Option<Self> {
        let index = (self.year * 12 + self.month as i32 - 1).checked_add(months)?;
        Self::new(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
    }

    /// Number of months from `self` to `other` (negative when `other` is earlier).
    pub fn months_until(&self, other: &BillingMonth) -> i32 {
        (other.year - self.year) * 12 + other.month as i32 - self.month as i32
    }

    /// Day the month's obligation falls due. Billing days past the end of a
    /// short month clamp to its last day, so day 31 in February is the 28th
    /// or 29th.
    pub fn cutoff(&self, billing_day: u32) -> NaiveDate {
        let day = billing_day.clamp(1, self.days_in_month());
        self.first_day().with_day(day).unwrap_or_else(|| self.last_day())
    }

    /// Canonical `"<MonthName> <Year>"` label.
    pub fn label(&self) -> String {
        format!("{} {:04}", MONTH_NAMES[(self.month - 1) as usize], self.year)
    }

    /// Parses a month label. See [`parse_label`] for the accepted forms.
    pub fn parse_label(label: &str) -> Result<Self, MonthLabelError> {
        let mut tokens = label.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| MonthLabelError::Malformed(label.to_string()))?;
        let mut year = tokens
            .next()
            .ok_or_else(|| MonthLabelError::Malformed(label.to_string()))?;
        if year.eq_ignore_ascii_case(LABEL_PREPOSITION) {
            year = tokens
                .next()
                .ok_or_else(|| MonthLabelError::Malformed(label.to_string()))?;
        }
        if tokens.next().is_some() {
            return Err(MonthLabelError::Malformed(label.to_string()));
        }

        let month = month_from_name(name)
            .ok_or_else(|| MonthLabelError::UnknownMonth(name.to_string()))?;
        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(MonthLabelError::InvalidYear(year.to_string()));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| MonthLabelError::InvalidYear(year.to_string()))?;
        BillingMonth::new(year, month)
            .ok_or_else(|| MonthLabelError::Malformed(label.to_string()))
    }

    /// Iterates up to `count` consecutive months starting with `self`,
    /// stopping early at December 9999.
    pub fn iter_forward(self, count: usize) -> impl Iterator<Item = BillingMonth> {
        (0..count).map_while(move |offset| self.add_months(i32::try_from(offset).ok()?))
    }
}

impl Ord for BillingMonth {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month).cmp(&(other.year, other.month))
    }
}

impl PartialOrd for BillingMonth {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for BillingMonth {
    type Err = MonthLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BillingMonth::parse_label(s)
    }
}

impl Serialize for BillingMonth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for BillingMonth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BillingMonth::parse_label(&raw).map_err(de::Error::custom)
    }
}

/// Returns the `"<MonthName> <Year>"` label for the month containing `date`,
/// or `None` when its year has more than four digits.
pub fn label_of(date: NaiveDate) -> Option<String> {
    BillingMonth::from_date(date).map(|month| month.label())
}

/// Parses `"<MonthName> <Year>"` or `"<MonthName> de <Year>"` (any case) into
/// the first day of that month.
pub fn parse_label(label: &str) -> Result<NaiveDate, MonthLabelError> {
    BillingMonth::parse_label(label).map(|month| month.first_day())
}

/// First day of the month after the one named by `label`.
pub fn next_month(label: &str) -> Result<NaiveDate, MonthLabelError> {
    BillingMonth::parse_label(label)?
        .succ()
        .map(|month| month.first_day())
        .ok_or_else(|| MonthLabelError::InvalidYear((MAX_YEAR + 1).to_string()))
}

/// Orders two labels by the months they name.
pub fn compare_labels(a: &str, b: &str) -> Result<Ordering, MonthLabelError> {
    Ok(BillingMonth::parse_label(a)?.cmp(&BillingMonth::parse_label(b)?))
}

/// Number of days in `month` of `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .map(|index| index as u32 + 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reasons a month label could not be parsed.
pub enum MonthLabelError {
    UnknownMonth(String),
    InvalidYear(String),
    Malformed(String),
}

impl fmt::Display for MonthLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthLabelError::UnknownMonth(name) => write!(f, "unknown month name `{name}`"),
            MonthLabelError::InvalidYear(year) => {
                write!(f, "year `{year}` is not a four-digit number")
            }
            MonthLabelError::Malformed(label) => write!(f, "malformed month label `{label}`"),
        }
    }
}

impl std::error::Error for MonthLabelError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn label_uses_canonical_names() {
        assert_eq!(label_of(date(2024, 1, 20)).unwrap(), "Enero 2024");
        assert_eq!(label_of(date(2023, 9, 1)).unwrap(), "Septiembre 2023");
        assert_eq!(label_of(date(2025, 12, 31)).unwrap(), "Diciembre 2025");
    }

    #[test]
    fn labels_round_trip_to_first_of_month() {
        for year in [1999, 2000, 2023, 2024, 2100] {
            for month in 1..=12 {
                let day = days_in_month(year, month);
                let original = date(year, month, day);
                let parsed = parse_label(&label_of(original).unwrap()).unwrap();
                assert_eq!(parsed, date(year, month, 1));
            }
        }
    }

    #[test]
    fn parse_accepts_preposition_and_any_case() {
        assert_eq!(parse_label("Enero de 2024").unwrap(), date(2024, 1, 1));
        assert_eq!(parse_label("MARZO 2024").unwrap(), date(2024, 3, 1));
        assert_eq!(parse_label("  julio   DE  2022 ").unwrap(), date(2022, 7, 1));
    }

    #[test]
    fn parse_rejects_bad_labels() {
        assert_eq!(
            parse_label("January 2024"),
            Err(MonthLabelError::UnknownMonth("January".into()))
        );
        assert_eq!(
            parse_label("Enero 24"),
            Err(MonthLabelError::InvalidYear("24".into()))
        );
        assert!(matches!(parse_label(""), Err(MonthLabelError::Malformed(_))));
        assert!(matches!(
            parse_label("Enero 2024 extra"),
            Err(MonthLabelError::Malformed(_))
        ));
    }

    #[test]
    fn next_month_wraps_years() {
        assert_eq!(next_month("Diciembre 2024").unwrap(), date(2025, 1, 1));
        assert_eq!(next_month("Febrero de 2024").unwrap(), date(2024, 3, 1));
    }

    #[test]
    fn labels_compare_chronologically_not_lexically() {
        // "Abril" sorts before "Enero" alphabetically.
        assert_eq!(
            compare_labels("Enero 2024", "Abril 2024").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_labels("Diciembre 2023", "Enero de 2024").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_labels("enero 2024", "Enero de 2024").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn cutoff_clamps_to_month_end() {
        let feb_leap = BillingMonth::new(2024, 2).unwrap();
        let feb = BillingMonth::new(2023, 2).unwrap();
        let april = BillingMonth::new(2024, 4).unwrap();
        assert_eq!(feb_leap.cutoff(31), date(2024, 2, 29));
        assert_eq!(feb.cutoff(31), date(2023, 2, 28));
        assert_eq!(april.cutoff(31), date(2024, 4, 30));
        assert_eq!(april.cutoff(15), date(2024, 4, 15));
    }

    #[test]
    fn month_arithmetic_crosses_years() {
        let jan = BillingMonth::new(2024, 1).unwrap();
        assert_eq!(jan.pred(), BillingMonth::new(2023, 12));
        assert_eq!(jan.add_months(14), BillingMonth::new(2025, 3));
        assert_eq!(jan.months_until(&BillingMonth::new(2025, 3).unwrap()), 14);
        let planned: Vec<_> = BillingMonth::new(2024, 11)
            .unwrap()
            .iter_forward(3)
            .map(|m| m.label())
            .collect();
        assert_eq!(planned, ["Noviembre 2024", "Diciembre 2024", "Enero 2025"]);
    }

    #[test]
    fn years_stay_within_four_digits() {
        assert_eq!(BillingMonth::new(10000, 1), None);
        assert_eq!(BillingMonth::new(-1, 12), None);
        assert_eq!(BillingMonth::new(2024, 13), None);
        assert_eq!(BillingMonth::from_date(date(10000, 1, 1)), None);
        assert_eq!(label_of(date(-1, 6, 1)), None);

        let last = BillingMonth::new(MAX_YEAR, 12).unwrap();
        let first = BillingMonth::new(MIN_YEAR, 1).unwrap();
        assert_eq!(last.succ(), None);
        assert_eq!(first.pred(), None);
        assert_eq!(last.iter_forward(3).count(), 1);
        assert!(matches!(
            next_month("Diciembre 9999"),
            Err(MonthLabelError::InvalidYear(_))
        ));
        assert_eq!(BillingMonth::from_date_clamped(date(12000, 5, 1)), last);
        assert_eq!(BillingMonth::from_date_clamped(date(-5, 5, 1)), first);

        for month in [first, last] {
            assert_eq!(BillingMonth::parse_label(&month.label()), Ok(month));
        }
        assert_eq!(first.label(), "Enero 0000");
    }

    #[test]
    fn serializes_as_label() {
        let month = BillingMonth::new(2024, 1).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"Enero 2024\"");
        let back: BillingMonth = serde_json::from_str("\"enero de 2024\"").unwrap();
        assert_eq!(back, month);
        assert!(serde_json::from_str::<BillingMonth>("\"Smarch 2024\"").is_err());
    }
}
