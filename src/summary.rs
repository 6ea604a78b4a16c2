// 📋 Data summary - what the `show` command and the dashboard read

use crate::aggregation::{breakdown_by_sex, total_both_sexes};
use crate::db::{count_categories, statistic_from_row, STATISTIC_SELECT};
use crate::entities::{Category, CategoryKind, Statistic};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i64,
    pub count: i64,
}

/// Worked example of the double-counting-free totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationExample {
    pub year: i64,
    pub age_group: String,
    pub hd_index: String,
    pub breakdown: BTreeMap<String, i64>,
    pub total_both_sexes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSummary {
    pub age_groups: i64,
    pub sexes: i64,
    pub hd_indices: i64,
    pub year: Option<i64>,
    pub total_statistics: i64,
    pub years: Vec<YearCount>,
    pub sample: Vec<Statistic>,
    pub example: Option<AggregationExample>,
}

impl DataSummary {
    pub fn load(conn: &Connection, year: Option<i64>, limit: usize) -> Result<Self> {
        let total_statistics: i64 = conn.query_row(
            "SELECT COUNT(*) FROM demographic_statistics WHERE ?1 IS NULL OR year = ?1",
            [year],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT year, COUNT(*) FROM demographic_statistics GROUP BY year ORDER BY year",
        )?;
        let years = stmt
            .query_map([], |row| Ok(YearCount { year: row.get(0)?, count: row.get(1)? }))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE ?1 IS NULL OR s.year = ?1 ORDER BY s.year, a.name, s.id LIMIT ?2",
            STATISTIC_SELECT
        ))?;
        let sample = stmt
            .query_map(params![year, i64::try_from(limit).unwrap_or(i64::MAX)], statistic_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let example = match year {
            Some(year) => aggregation_example(conn, year)?,
            None => None,
        };

        Ok(DataSummary {
            age_groups: count_categories(conn, CategoryKind::AgeGroup)?,
            sexes: count_categories(conn, CategoryKind::Sex)?,
            hd_indices: count_categories(conn, CategoryKind::HdIndex)?,
            year,
            total_statistics,
            years,
            sample,
            example,
        })
    }
}

fn first_granular(conn: &Connection, kind: CategoryKind) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            &format!(
                "SELECT id, name, is_aggregate FROM {} WHERE is_aggregate = 0 ORDER BY id LIMIT 1",
                kind.table()
            ),
            [],
            |row| Ok(Category::new(row.get(0)?, kind, row.get::<_, String>(1)?, row.get(2)?)),
        )
        .optional()?;
    Ok(category)
}

fn aggregation_example(conn: &Connection, year: i64) -> Result<Option<AggregationExample>> {
    let (Some(age_group), Some(hd_index)) = (
        first_granular(conn, CategoryKind::AgeGroup)?,
        first_granular(conn, CategoryKind::HdIndex)?,
    ) else {
        return Ok(None);
    };

    Ok(Some(AggregationExample {
        year,
        breakdown: breakdown_by_sex(conn, year, &age_group, &hd_index)?,
        total_both_sexes: total_both_sexes(conn, year, &age_group, &hd_index)?,
        age_group: age_group.name,
        hd_index: hd_index.name,
    }))
}

/// Distinct values present in the fact table, for dashboard filter widgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i64>,
    pub age_groups: Vec<String>,
    pub sexes: Vec<String>,
    pub hd_indices: Vec<String>,
    pub total_records: i64,
}

impl FilterOptions {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT DISTINCT year FROM demographic_statistics ORDER BY year")?;
        let years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(FilterOptions {
            years,
            age_groups: used_names(conn, CategoryKind::AgeGroup)?,
            sexes: used_names(conn, CategoryKind::Sex)?,
            hd_indices: used_names(conn, CategoryKind::HdIndex)?,
            total_records: crate::db::count_statistics(conn)?,
        })
    }
}

fn used_names(conn: &Connection, kind: CategoryKind) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT c.name FROM {table} c
         JOIN demographic_statistics s ON s.{fk} = c.id
         ORDER BY c.name",
        table = kind.table(),
        fk = kind.foreign_key(),
    ))?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::importer::DemographicsImporter;
    use crate::normalizer::RawRow;
    use std::time::Duration;

    fn row(year: &str, age: &str, sex: &str, hdi: &str, value: &str) -> RawRow {
        [
            ("Year", year),
            ("Age Group", age),
            ("Sex", sex),
            ("Human Development Index Rating", hdi),
            ("VALUE", value),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let rows = vec![
            row("2022", "0 - 4 years", "1", "20", "10"),
            row("2023", "0 - 4 years", "1", "20", "100"),
            row("2023", "0 - 4 years", "2", "20", "90"),
            row("2023", "5 - 9 years", "2", "30", "40"),
        ];
        let report = DemographicsImporter::with_timeout(Duration::from_secs(1)).import_rows(&mut conn, &rows);
        assert_eq!(report.imported_rows, 4);
        conn
    }

    #[test]
    fn test_summary_counts() {
        let conn = seeded();
        let summary = DataSummary::load(&conn, None, 10).unwrap();

        assert_eq!(summary.age_groups, 2);
        assert_eq!(summary.sexes, 2);
        assert_eq!(summary.hd_indices, 2);
        assert_eq!(summary.total_statistics, 4);
        assert_eq!(
            summary.years,
            vec![YearCount { year: 2022, count: 1 }, YearCount { year: 2023, count: 3 }]
        );
        assert_eq!(summary.sample.len(), 4);
        assert!(summary.example.is_none());
    }

    #[test]
    fn test_summary_for_year_has_example() {
        let conn = seeded();
        let summary = DataSummary::load(&conn, Some(2023), 2).unwrap();

        assert_eq!(summary.total_statistics, 3);
        assert_eq!(summary.sample.len(), 2);
        assert!(summary.sample.iter().all(|s| s.year == 2023));

        let example = summary.example.unwrap();
        assert_eq!(example.age_group, "0 - 4 years");
        assert_eq!(example.hd_index, "High Human Development Index (HDI)");
        assert_eq!(example.breakdown.len(), 2);
        assert_eq!(example.total_both_sexes, 190);
    }

    #[test]
    fn test_summary_limit_bounds() {
        let conn = seeded();

        assert!(DataSummary::load(&conn, None, 0).unwrap().sample.is_empty());
        assert_eq!(DataSummary::load(&conn, None, usize::MAX).unwrap().sample.len(), 4);
    }

    #[test]
    fn test_filter_options() {
        let conn = seeded();
        let options = FilterOptions::load(&conn).unwrap();

        assert_eq!(options.years, vec![2022, 2023]);
        assert_eq!(options.age_groups, vec!["0 - 4 years", "5 - 9 years"]);
        assert_eq!(options.sexes, vec!["Female", "Male"]);
        assert_eq!(options.total_records, 4);
    }
}
