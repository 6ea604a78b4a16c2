// 🔎 Filtering - the read boundary over the fact table
//
// Category arguments arrive either resolved (`CategoryRef::Resolved`) or as
// plain names (`CategoryRef::Named`). Names are resolved first; a name that
// matches no category is a validation error, never an empty result.

use crate::db::{find_category, statistic_from_row, STATISTIC_SELECT};
use crate::entities::{Category, CategoryKind, CategoryRef, Statistic};
use rusqlite::{params_from_iter, Connection};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid {field} parameter: '{value}' does not exist.")]
    UnknownCategory { field: &'static str, value: String },

    #[error("Invalid {field} parameter: '{value}'.")]
    InvalidParameter { field: &'static str, value: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl FilterError {
    /// Validation failures are the caller's fault (4xx); storage failures are not
    pub fn is_validation(&self) -> bool {
        !matches!(self, FilterError::Storage(_))
    }
}

impl From<rusqlite::Error> for FilterError {
    fn from(err: rusqlite::Error) -> Self {
        FilterError::Storage(err.into())
    }
}

// ============================================================================
// ORDERING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatisticOrdering {
    #[default]
    Year,
    YearDesc,
    Value,
    ValueDesc,
}

impl StatisticOrdering {
    fn sql(&self) -> &'static str {
        match self {
            StatisticOrdering::Year => "s.year ASC, s.id ASC",
            StatisticOrdering::YearDesc => "s.year DESC, s.id ASC",
            StatisticOrdering::Value => "s.value ASC, s.id ASC",
            StatisticOrdering::ValueDesc => "s.value DESC, s.id ASC",
        }
    }
}

impl FromStr for StatisticOrdering {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(StatisticOrdering::Year),
            "-year" => Ok(StatisticOrdering::YearDesc),
            "value" => Ok(StatisticOrdering::Value),
            "-value" => Ok(StatisticOrdering::ValueDesc),
            other => Err(FilterError::InvalidParameter {
                field: "ordering",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Omitted parameters do not filter
#[derive(Debug, Clone, Default)]
pub struct StatisticFilter {
    pub year: Option<i64>,
    pub age_group: Option<CategoryRef>,
    pub sex: Option<CategoryRef>,
    pub hd_index: Option<CategoryRef>,
    pub ordering: StatisticOrdering,
}

impl StatisticFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(mut self, year: i64) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_age_group(mut self, age_group: impl Into<CategoryRef>) -> Self {
        self.age_group = Some(age_group.into());
        self
    }

    pub fn with_sex(mut self, sex: impl Into<CategoryRef>) -> Self {
        self.sex = Some(sex.into());
        self
    }

    pub fn with_hd_index(mut self, hd_index: impl Into<CategoryRef>) -> Self {
        self.hd_index = Some(hd_index.into());
        self
    }

    pub fn with_ordering(mut self, ordering: StatisticOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Build from untrusted query-string values (all optional strings)
    pub fn from_params(
        year: Option<&str>,
        age_group: Option<&str>,
        sex: Option<&str>,
        hd_index: Option<&str>,
        ordering: Option<&str>,
    ) -> Result<Self, FilterError> {
        let mut filter = StatisticFilter::new();

        if let Some(raw) = year.filter(|v| !v.is_empty()) {
            let year = raw.trim().parse::<i64>().map_err(|_| FilterError::InvalidParameter {
                field: "year",
                value: raw.to_string(),
            })?;
            filter.year = Some(year);
        }

        filter.age_group = age_group.filter(|v| !v.is_empty()).map(CategoryRef::from);
        filter.sex = sex.filter(|v| !v.is_empty()).map(CategoryRef::from);
        filter.hd_index = hd_index.filter(|v| !v.is_empty()).map(CategoryRef::from);

        if let Some(raw) = ordering.filter(|v| !v.is_empty()) {
            filter.ordering = raw.parse()?;
        }

        Ok(filter)
    }
}

fn resolve(conn: &Connection, kind: CategoryKind, reference: &CategoryRef) -> Result<Category, FilterError> {
    match reference {
        CategoryRef::Resolved(category) if category.kind == kind => Ok(category.clone()),
        CategoryRef::Resolved(category) => Err(FilterError::InvalidParameter {
            field: kind.field(),
            value: format!("{} ({})", category.name, category.kind),
        }),
        CategoryRef::Named(name) => find_category(conn, kind, name)?.ok_or_else(|| {
            FilterError::UnknownCategory {
                field: kind.field(),
                value: name.clone(),
            }
        }),
    }
}

/// Statistics matching every given parameter
pub fn filter_statistics(conn: &Connection, filter: &StatisticFilter) -> Result<Vec<Statistic>, FilterError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<i64> = Vec::new();

    if let Some(year) = filter.year {
        values.push(year);
        clauses.push(format!("s.year = ?{}", values.len()));
    }

    let dimensions = [
        (CategoryKind::AgeGroup, &filter.age_group),
        (CategoryKind::Sex, &filter.sex),
        (CategoryKind::HdIndex, &filter.hd_index),
    ];
    for (kind, reference) in dimensions {
        if let Some(reference) = reference {
            let category = resolve(conn, kind, reference)?;
            values.push(category.id);
            clauses.push(format!("s.{} = ?{}", kind.foreign_key(), values.len()));
        }
    }

    let mut sql = STATISTIC_SELECT.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(filter.ordering.sql());

    let mut stmt = conn.prepare(&sql)?;
    let stats = stmt
        .query_map(params_from_iter(values.iter()), statistic_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}
