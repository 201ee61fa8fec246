//! Metric and cumulative-metric definitions.

use std::fmt;

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use super::model::Column;

/// Granularity of a cumulative-metric window and of the date spine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
            TimeUnit::Month => "MONTH",
            TimeUnit::Quarter => "QUARTER",
            TimeUnit::Year => "YEAR",
        }
    }

    /// Lowercase name as used in `date_trunc` and interval literals.
    pub fn sql_name(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Quarter => "quarter",
            TimeUnit::Year => "year",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HOUR" => Some(TimeUnit::Hour),
            "DAY" => Some(TimeUnit::Day),
            "WEEK" => Some(TimeUnit::Week),
            "MONTH" => Some(TimeUnit::Month),
            "QUARTER" => Some(TimeUnit::Quarter),
            "YEAR" => Some(TimeUnit::Year),
            _ => None,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TimeUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimeUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TimeUnit::parse(&s).ok_or_else(|| {
            de::Error::custom(format!(
                "unknown time unit '{}', expected one of HOUR, DAY, WEEK, MONTH, QUARTER, YEAR",
                s
            ))
        })
    }
}

/// An aggregated logical relation over a base object.
///
/// Dimensions become the GROUP BY keys of the emitted CTE; measures are
/// aggregate expressions over the base object's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Metric {
    pub name: String,
    pub base_object: String,
    pub dimensions: Vec<Column>,
    pub measures: Vec<Column>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        base_object: impl Into<String>,
        dimensions: Vec<Column>,
        measures: Vec<Column>,
    ) -> Self {
        Self {
            name: name.into(),
            base_object: base_object.into(),
            dimensions,
            measures,
            cached: false,
            refresh_time: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.dimensions
            .iter()
            .chain(self.measures.iter())
            .find(|c| c.name == name)
    }

    pub fn is_dimension(&self, name: &str) -> bool {
        self.dimensions.iter().any(|c| c.name == name)
    }
}

/// The single aggregated measure of a cumulative metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Measure {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
    /// Aggregation operator, e.g. `sum`, `count`, `max`.
    pub operator: String,
    /// Source column of the base object the operator folds over.
    pub ref_column: String,
}

/// The densification window of a cumulative metric. Bounds are inclusive
/// ISO dates; `start <= end` is checked at manifest analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Window {
    /// Output column name carrying the spine bucket.
    pub name: String,
    /// Time column of the base object the window buckets.
    pub ref_column: String,
    pub time_unit: TimeUnit,
    pub start: String,
    pub end: String,
}

impl Window {
    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.start, "%Y-%m-%d").ok()
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.end, "%Y-%m-%d").ok()
    }
}

/// A metric densified over a date spine: every bucket of the window is
/// present in the output, carrying the running aggregate up to that bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CumulativeMetric {
    pub name: String,
    pub base_object: String,
    pub measure: Measure,
    pub window: Window,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
}

/// Manifest-level date spine the cumulative metrics densify against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DateSpine {
    pub unit: TimeUnit,
    pub start: String,
    pub end: String,
}

impl Default for DateSpine {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Day,
            start: "1970-01-01".into(),
            end: "2077-12-31".into(),
        }
    }
}
