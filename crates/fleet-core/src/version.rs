//! Build versions and their ordering.
//!
//! A build version is the caller's label with a build stamp appended:
//! `label-year-month-day-millisOfDay`. The stamp makes every rebuild unique
//! even when the label does not change, and gives rollback a chronological
//! order to work with.
//!
//! Stamp fields are unpadded (`2015-9-4-...`), so build identifiers are
//! compared field by field rather than as strings.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// A caller label plus the build stamp appended at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVersion {
    label: String,
    stamp: String,
}

impl BuildVersion {
    /// Stamp `label` with the given build time.
    pub fn stamped(label: &str, at: NaiveDateTime) -> CoreResult<Self> {
        if label.is_empty() {
            return Err(CoreError::EmptyVersion);
        }
        Ok(Self {
            label: label.to_string(),
            stamp: build_stamp(at),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.label, self.stamp)
    }
}

/// `year-month-day-millisOfDay`, unpadded.
pub fn build_stamp(at: NaiveDateTime) -> String {
    let millis_of_day = u64::from(at.num_seconds_from_midnight()) * 1000
        + u64::from(at.nanosecond() / 1_000_000).min(999);
    format!("{}-{}-{}-{}", at.year(), at.month(), at.day(), millis_of_day)
}

/// A parsed `repo:label-year-month-day-millis` image reference.
///
/// Field order matters: the derived `Ord` compares repository and label
/// lexicographically, then the date numerically, then the millisecond tail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BuildIdentifier {
    repository: String,
    label: String,
    year: i32,
    month: u32,
    day: u32,
    millis: u64,
}

impl BuildIdentifier {
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }
}

impl FromStr for BuildIdentifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| CoreError::MalformedBuild {
            identifier: s.to_string(),
            reason: reason.to_string(),
        };

        let (repository, version) = s.rsplit_once(':').ok_or_else(|| malformed("missing ':'"))?;
        if repository.is_empty() || version.contains('/') {
            return Err(malformed("missing repository"));
        }

        // Date fields come from the right so labels may contain '-'.
        let mut parts = version.rsplitn(5, '-');
        let millis = parts.next().ok_or_else(|| malformed("missing timestamp"))?;
        let day = parts.next().ok_or_else(|| malformed("missing day"))?;
        let month = parts.next().ok_or_else(|| malformed("missing month"))?;
        let year = parts.next().ok_or_else(|| malformed("missing year"))?;
        let label = parts.next().ok_or_else(|| malformed("missing version label"))?;

        Ok(Self {
            repository: repository.to_string(),
            label: label.to_string(),
            year: year.parse().map_err(|_| malformed("year is not numeric"))?,
            month: month.parse().map_err(|_| malformed("month is not numeric"))?,
            day: day.parse().map_err(|_| malformed("day is not numeric"))?,
            millis: millis.parse().map_err(|_| malformed("timestamp is not numeric"))?,
        })
    }
}

impl fmt::Display for BuildIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}-{}-{}-{}",
            self.repository, self.label, self.year, self.month, self.day, self.millis
        )
    }
}

/// Compare two build identifiers.
pub fn compare_build_identifiers(a: &str, b: &str) -> CoreResult<Ordering> {
    let a: BuildIdentifier = a.parse()?;
    let b: BuildIdentifier = b.parse()?;
    Ok(a.cmp(&b))
}

/// Keep the candidates strictly older than `current`, in the order given.
///
/// Candidates that do not parse as build identifiers are dropped.
pub fn older_than<'a, I>(current: &BuildIdentifier, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter(|tag| match tag.parse::<BuildIdentifier>() {
            Ok(candidate) => candidate < *current,
            Err(e) => {
                debug!(%tag, error = %e, "skipping tag that is not a build identifier");
                false
            }
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_milli_opt(h, min, s, ms)
            .unwrap()
    }

    #[test]
    fn stamp_is_unpadded_with_millis_of_day() {
        assert_eq!(build_stamp(at(2015, 9, 4, 0, 0, 1, 250)), "2015-9-4-1250");
        assert_eq!(build_stamp(at(2024, 12, 31, 1, 0, 0, 0)), "2024-12-31-3600000");
    }

    #[test]
    fn stamped_version_appends_stamp() {
        let v = BuildVersion::stamped("1.0.0", at(2015, 9, 4, 0, 0, 2, 0)).unwrap();
        assert_eq!(v.to_string(), "1.0.0-2015-9-4-2000");
        assert_eq!(v.label(), "1.0.0");
    }

    #[test]
    fn stamped_version_rejects_empty_label() {
        assert!(matches!(
            BuildVersion::stamped("", at(2015, 9, 4, 0, 0, 0, 0)),
            Err(CoreError::EmptyVersion)
        ));
    }

    #[test]
    fn parse_round_trips_display() {
        let id: BuildIdentifier = "acme/carbon:1.0.0-2015-9-4-1250".parse().unwrap();
        assert_eq!(id.repository(), "acme/carbon");
        assert_eq!(id.label(), "1.0.0");
        assert_eq!(id.millis(), 1250);
        assert_eq!(id.to_string(), "acme/carbon:1.0.0-2015-9-4-1250");
    }

    #[test]
    fn parse_keeps_dashes_in_label() {
        let id: BuildIdentifier = "acme/carbon:5.0.0-SNAPSHOT-2015-9-4-10".parse().unwrap();
        assert_eq!(id.label(), "5.0.0-SNAPSHOT");
    }

    #[test]
    fn parse_rejects_unstamped_tags() {
        assert!("acme/carbon:latest".parse::<BuildIdentifier>().is_err());
        assert!("acme/carbon".parse::<BuildIdentifier>().is_err());
        assert!("acme/carbon:1.0-2015-x-4-10".parse::<BuildIdentifier>().is_err());
    }

    #[test]
    fn same_day_orders_by_timestamp() {
        assert_eq!(
            compare_build_identifiers("a/c:1-2015-9-4-100", "a/c:1-2015-9-4-2000").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_build_identifiers("a/c:1-2015-9-4-2000", "a/c:1-2015-9-4-100").unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn date_fields_compare_numerically() {
        // "9" > "10" as strings; September is still before October.
        assert_eq!(
            compare_build_identifiers("a/c:1-2015-9-30-0", "a/c:1-2015-10-1-0").unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn identical_identifiers_are_equal() {
        let x = "a/c:1.0-2015-9-4-100";
        assert_eq!(compare_build_identifiers(x, x).unwrap(), Ordering::Equal);
    }

    #[test]
    fn ordering_is_transitive() {
        let ids = [
            "a/c:1.0-2015-9-4-100",
            "a/c:1.0-2015-9-4-200",
            "a/c:1.0-2015-10-1-0",
            "a/c:1.0-2016-1-1-5",
        ];
        for x in &ids {
            for y in &ids {
                for z in &ids {
                    let xy = compare_build_identifiers(x, y).unwrap();
                    let yz = compare_build_identifiers(y, z).unwrap();
                    if xy == Ordering::Less && yz == Ordering::Less {
                        assert_eq!(compare_build_identifiers(x, z).unwrap(), Ordering::Less);
                    }
                }
            }
        }
    }

    #[test]
    fn older_than_keeps_discovery_order() {
        let current: BuildIdentifier = "acme/carbon:1.0-2015-9-4-500".parse().unwrap();
        let candidates = [
            "acme/carbon:1.0-2015-9-4-300",
            "acme/carbon:1.0-2015-9-4-900",
            "acme/carbon:1.0-2015-9-4-500",
            "acme/carbon:latest",
            "acme/carbon:1.0-2015-9-3-999",
        ];
        let older = older_than(&current, candidates);
        assert_eq!(
            older,
            vec![
                "acme/carbon:1.0-2015-9-4-300".to_string(),
                "acme/carbon:1.0-2015-9-3-999".to_string(),
            ]
        );
    }
}
