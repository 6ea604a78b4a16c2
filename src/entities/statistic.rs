// 📊 Statistic Entity - one population count per (year, age group, sex, HD index)

use super::category::Category;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Domain invariant violations, raised before anything reaches the database
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatisticError {
    #[error("Value cannot be negative (got {0})")]
    NegativeValue(i64),

    #[error("Year must be a positive integer (got {0})")]
    InvalidYear(i64),
}

/// Domain check shared by the write and read models
pub fn check(year: i64, value: i64) -> Result<(), StatisticError> {
    if year <= 0 {
        return Err(StatisticError::InvalidYear(year));
    }
    if value < 0 {
        return Err(StatisticError::NegativeValue(value));
    }
    Ok(())
}

// ============================================================================
// WRITE MODEL
// ============================================================================

/// A validated fact row ready to be upserted. Only constructible through `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatistic {
    year: i64,
    age_group_id: i64,
    sex_id: i64,
    hd_index_id: i64,
    value: i64,
}

impl NewStatistic {
    pub fn new(
        year: i64,
        age_group: &Category,
        sex: &Category,
        hd_index: &Category,
        value: i64,
    ) -> Result<Self, StatisticError> {
        check(year, value)?;

        Ok(NewStatistic {
            year,
            age_group_id: age_group.id,
            sex_id: sex.id,
            hd_index_id: hd_index.id,
            value,
        })
    }

    /// Unique key: (year, age_group_id, sex_id, hd_index_id)
    pub fn key(&self) -> (i64, i64, i64, i64) {
        (self.year, self.age_group_id, self.sex_id, self.hd_index_id)
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

// ============================================================================
// READ MODEL
// ============================================================================

/// A stored fact row with its categories joined in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistic {
    pub id: i64,
    pub year: i64,
    pub age_group: Category,
    pub sex: Category,
    pub hd_index: Category,
    pub value: i64,
}

impl Statistic {
    /// Re-check the domain invariants on a row assembled by hand
    pub fn clean(&self) -> Result<(), StatisticError> {
        check(self.year, self.value)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}: {}",
            self.year, self.age_group, self.sex, self.hd_index, self.value
        )
    }
}
