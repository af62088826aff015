use std::fmt;
use std::str::FromStr;

/// A calendar month written as `MM-YYYY`.
///
/// Field order makes the derived `Ord` chronological: `12-2023 < 01-2024`,
/// which plain string comparison of the `MM-YYYY` text gets wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: u16,
    month: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid period, expected MM-YYYY")]
pub struct InvalidPeriod(pub String);

impl Period {
    pub fn new(month: u8, year: u16) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// `YYYYMM` as an integer; orders the same way as `Period` itself.
    pub fn sort_key(self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.month)
    }
}

impl FromStr for Period {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPeriod(s.to_string());

        let (month, year) = s.split_once('-').ok_or_else(invalid)?;
        if month.len() != 2 || year.len() != 4 {
            return Err(invalid());
        }
        if !month.bytes().chain(year.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let month: u8 = month.parse().map_err(|_| invalid())?;
        let year: u16 = year.parse().map_err(|_| invalid())?;
        Period::new(month, year).ok_or_else(invalid)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}
