// 🧹 Row Normalizer
// Turns one raw CSV record into canonical category names + integers

use crate::entities::category::{ALL_AGES, ALL_HDI_RATINGS, BOTH_SEXES};
use crate::entities::StatisticError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// INPUT SHAPE
// ============================================================================

pub const YEAR: &str = "Year";
pub const AGE_GROUP: &str = "Age Group";
pub const SEX: &str = "Sex";
pub const HDI_RATING: &str = "Human Development Index Rating";
pub const VALUE: &str = "VALUE";

pub const REQUIRED_FIELDS: [&str; 5] = [YEAR, AGE_GROUP, SEX, HDI_RATING, VALUE];

/// One input record, header name → cell text
pub type RawRow = HashMap<String, String>;

/// Sex code → canonical name
const SEX_CODES: [(&str, &str); 3] = [("1", "Male"), ("2", "Female"), ("-", BOTH_SEXES)];

/// HD-index rating code → canonical name
const HDI_CODES: [(&str, &str); 5] = [
    ("10", ALL_HDI_RATINGS),
    ("20", "High Human Development Index (HDI)"),
    ("30", "Low Human Development Index (HDI)"),
    ("40", "Medium Human Development Index (HDI)"),
    ("50", "Very High Human Development Index (HDI)"),
];

/// Raw cell values that mark a row as a precomputed total
const AGGREGATE_MARKERS: [(&str, &[&str]); 3] = [
    (AGE_GROUP, &[ALL_AGES]),
    (SEX, &["-", BOTH_SEXES]),
    (HDI_RATING, &["10", ALL_HDI_RATINGS]),
];

/// Map a sex code; unknown codes pass through unchanged
pub fn sex_name(code: &str) -> &str {
    SEX_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Map an HD-index rating code; unknown codes pass through unchanged
pub fn hdi_name(code: &str) -> &str {
    HDI_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Aggregate pre-filter, applied on raw values before `normalize`
pub fn is_aggregate_row(row: &RawRow) -> bool {
    AGGREGATE_MARKERS.iter().any(|(column, markers)| {
        row.get(*column)
            .map(|v| markers.contains(&v.as_str()))
            .unwrap_or(false)
    })
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub year: i64,
    pub age_group: String,
    pub sex: String,
    pub hd_index: String,
    pub value: i64,
}

/// Why a row could not be imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingField(&'static str),
    InvalidNumber { field: &'static str, value: String },
    InvalidEncoding(String),
    Invalid(StatisticError),
    Persistence(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "Missing required field: {}", field),
            RejectReason::InvalidNumber { field, value } => {
                write!(f, "Invalid {}: {:?} is not an integer", field, value)
            }
            RejectReason::InvalidEncoding(field) => write!(f, "Invalid UTF-8 in field: {}", field),
            RejectReason::Invalid(err) => write!(f, "{}", err),
            RejectReason::Persistence(msg) => write!(f, "Failed to save row: {}", msg),
        }
    }
}

fn required<'a>(row: &'a RawRow, field: &'static str) -> Result<&'a str, RejectReason> {
    match row.get(field) {
        Some(v) if !v.is_empty() => Ok(v.as_str()),
        _ => Err(RejectReason::MissingField(field)),
    }
}

fn integer(row: &RawRow, field: &'static str) -> Result<i64, RejectReason> {
    let raw = required(row, field)?;
    raw.trim().parse::<i64>().map_err(|_| RejectReason::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

/// Normalize one raw record. Never panics; a rejected row carries its reason.
pub fn normalize(row: &RawRow) -> Result<NormalizedRow, RejectReason> {
    for field in REQUIRED_FIELDS {
        required(row, field)?;
    }

    let year = integer(row, YEAR)?;
    let value = integer(row, VALUE)?;

    Ok(NormalizedRow {
        year,
        age_group: required(row, AGE_GROUP)?.to_string(),
        sex: sex_name(required(row, SEX)?).to_string(),
        hd_index: hdi_name(required(row, HDI_RATING)?).to_string(),
        value,
    })
}
