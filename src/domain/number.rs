use std::{fmt, num::NonZeroU32, str::FromStr};

use serde::{Deserialize, Serialize};

/// The human-readable number of a requirement.
///
/// Format: `REQ-{YEAR}-{SEQ}`, where:
/// - `YEAR` is the four-digit year the requirement was registered in
/// - `SEQ` is a positive non-zero sequence number, conceptually reset per
///   year (e.g. `0001`, `0042`)
///
/// Examples: `REQ-2025-0001`, `REQ-2026-0137`
///
/// Numbers are allocated by the registry by scanning the existing numbers for
/// the year and taking the maximum plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReqNumber {
    year: i32,
    seq: NonZeroU32,
}

impl ReqNumber {
    /// Create a requirement number from pre-validated components.
    #[must_use]
    pub const fn new(year: i32, seq: NonZeroU32) -> Self {
        Self { year, seq }
    }

    /// The year component.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The sequence component.
    #[must_use]
    pub const fn seq(&self) -> NonZeroU32 {
        self.seq
    }

    /// Returns a displayable representation with the specified digit width
    /// for the sequence component.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroU32;
    ///
    /// use acopio::ReqNumber;
    ///
    /// let number = ReqNumber::new(2026, NonZeroU32::new(42).unwrap());
    ///
    /// assert_eq!(number.display(4).to_string(), "REQ-2026-0042");
    /// assert_eq!(number.display(2).to_string(), "REQ-2026-42");
    /// ```
    #[must_use]
    pub const fn display(&self, digits: usize) -> FormattedNumber<'_> {
        FormattedNumber {
            number: self,
            digits,
        }
    }
}

/// Default sequence padding used when no configuration is in scope.
pub const DEFAULT_DIGITS: usize = 4;

impl fmt::Display for ReqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.display(DEFAULT_DIGITS).fmt(f)
    }
}

/// A wrapper type that formats a requirement number with a specified
/// sequence digit width.
///
/// Returned by [`ReqNumber::display`].
#[derive(Debug, Clone, Copy)]
pub struct FormattedNumber<'a> {
    number: &'a ReqNumber,
    digits: usize,
}

impl fmt::Display for FormattedNumber<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "REQ-{:04}-{:0width$}",
            self.number.year,
            self.number.seq,
            width = self.digits
        )
    }
}

/// Errors that can occur when parsing a requirement number.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed structure (wrong prefix or segment count).
    #[error("invalid requirement number '{0}': expected REQ-YYYY-NNNN")]
    Syntax(String),

    /// The year segment is not a four-digit integer.
    #[error("invalid year in requirement number '{0}'")]
    Year(String),

    /// The sequence segment is not a positive non-zero integer.
    #[error("invalid sequence in requirement number '{0}': expected a non-zero integer")]
    Seq(String),
}

impl FromStr for ReqNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');

        if parts.next() != Some("REQ") {
            return Err(Error::Syntax(s.to_string()));
        }

        let year_str = parts.next().ok_or_else(|| Error::Syntax(s.to_string()))?;
        let seq_str = parts.next().ok_or_else(|| Error::Syntax(s.to_string()))?;
        if parts.next().is_some() {
            return Err(Error::Syntax(s.to_string()));
        }

        if year_str.len() != 4 {
            return Err(Error::Year(s.to_string()));
        }
        let year = year_str
            .parse::<i32>()
            .map_err(|_| Error::Year(s.to_string()))?;

        let seq = seq_str
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| Error::Seq(s.to_string()))?;

        Ok(Self { year, seq })
    }
}

impl TryFrom<&str> for ReqNumber {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Serialize for ReqNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReqNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
