use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identifies one issue: the year plus the issue number within that year.
///
/// Accepts `2017/05` as printed on the site and `2017.05` as used in file
/// names. Always displays as `2017/05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssueId {
    year: u16,
    number: u8,
}

impl IssueId {
    pub fn new(year: u16, number: u8) -> Result<Self> {
        if !(1000..=9999).contains(&year) || !(1..=99).contains(&number) {
            return Err(Error::invalid_issue(format!("{}/{}", year, number)));
        }
        Ok(Self { year, number })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// `2017.05`, safe to use in a file name.
    pub fn file_stem(&self) -> String {
        format!("{}.{:02}", self.year, self.number)
    }

    /// Directory of this issue relative to the cache root.
    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(self.year.to_string()).join(format!("{:02}", self.number))
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}", self.year, self.number)
    }
}

impl FromStr for IssueId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (year, number) = trimmed
            .split_once(['/', '.'])
            .ok_or_else(|| Error::invalid_issue(s))?;

        let digits = |part: &str, len: std::ops::RangeInclusive<usize>| {
            len.contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(year, 4..=4) || !digits(number, 1..=2) {
            return Err(Error::invalid_issue(s));
        }

        let year = year.parse().map_err(|_| Error::invalid_issue(s))?;
        let number = number.parse().map_err(|_| Error::invalid_issue(s))?;
        Self::new(year, number).map_err(|_| Error::invalid_issue(s))
    }
}
