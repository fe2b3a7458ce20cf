//! Academic years and class levels.
//!
//! Academic years are written `YYYY-YYYY` with consecutive four-digit years. Levels
//! advance along the fixed sequence `L3 -> L4 -> L5`.

use crate::errors::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Earliest accepted starting calendar year
pub const MIN_START_YEAR: i32 = 1000;
/// Latest accepted starting calendar year
pub const MAX_START_YEAR: i32 = 9998;

/// A parsed `YYYY-YYYY` academic year, starting in
/// `MIN_START_YEAR..=MAX_START_YEAR`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcademicYear {
    start: i32,
}

impl AcademicYear {
    /// Calendar year the academic year starts in
    #[must_use]
    pub const fn start_year(self) -> i32 {
        self.start
    }

    /// The academic year that follows this one
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the next year starts after `MAX_START_YEAR`.
    pub fn next(self) -> Result<Self> {
        match self.start.checked_add(1) {
            Some(start) if start <= MAX_START_YEAR => Ok(Self { start }),
            _ => Err(Error::InvalidInput {
                message: format!("No academic year follows {self}"),
            }),
        }
    }
}

impl FromStr for AcademicYear {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput {
            message: format!("Academic year must look like 2024-2025, got '{s}'"),
        };
        let (first, second) = s.trim().split_once('-').ok_or_else(invalid)?;
        let start: i32 = first.parse().map_err(|_| invalid())?;
        let end: i32 = second.parse().map_err(|_| invalid())?;
        if !(MIN_START_YEAR..=MAX_START_YEAR).contains(&start) || start.checked_add(1) != Some(end) {
            return Err(invalid());
        }
        Ok(Self { start })
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.start + 1)
    }
}

/// Class level within a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Level 3, the entry level
    L3,
    /// Level 4
    L4,
    /// Level 5, the final level
    L5,
}

impl Level {
    /// The level a passing student moves to, `None` at the final level
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::L3 => Some(Self::L4),
            Self::L4 => Some(Self::L5),
            Self::L5 => None,
        }
    }

    /// Stored code, e.g. `"L4"`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L3 => "L3",
            Self::L4 => "L4",
            Self::L5 => "L5",
        }
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L3" => Ok(Self::L3),
            "L4" => Ok(Self::L4),
            "L5" => Ok(Self::L5),
            other => Err(Error::InvalidInput {
                message: format!("Unknown class level '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
