// ➕ Aggregation Engine - totals derived from granular rows only
//
// Aggregate rows are never imported, so these queries are the only source of
// totals. Each one fixes two dimensions and sums over the third, keeping only
// the members of the collapsed dimension whose `is_aggregate` flag is false.

use crate::entities::{Category, CategoryKind, Statistic};
use anyhow::{ensure, Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn expect_kind(category: &Category, kind: CategoryKind) -> Result<()> {
    ensure!(
        category.kind == kind,
        "Expected {} category, got {} '{}'",
        kind,
        category.kind,
        category.name
    );
    Ok(())
}

/// SUM(value) over the non-aggregate members of `collapse`, with the other two
/// dimensions pinned to `fixed`
fn sum_over(conn: &Connection, collapse: CategoryKind, year: i64, fixed: [&Category; 2]) -> Result<i64> {
    let sql = format!(
        "SELECT COALESCE(SUM(s.value), 0)
         FROM demographic_statistics s
         JOIN {table} c ON c.id = s.{collapsed}
         WHERE s.year = ?1 AND s.{first} = ?2 AND s.{second} = ?3 AND c.is_aggregate = 0",
        table = collapse.table(),
        collapsed = collapse.foreign_key(),
        first = fixed[0].kind.foreign_key(),
        second = fixed[1].kind.foreign_key(),
    );

    conn.query_row(&sql, params![year, fixed[0].id, fixed[1].id], |row| row.get(0))
        .with_context(|| format!("Failed to total {} for {}", collapse, year))
}

/// Total over both sexes (Male + Female + any other granular sex)
pub fn total_both_sexes(conn: &Connection, year: i64, age_group: &Category, hd_index: &Category) -> Result<i64> {
    expect_kind(age_group, CategoryKind::AgeGroup)?;
    expect_kind(hd_index, CategoryKind::HdIndex)?;
    sum_over(conn, CategoryKind::Sex, year, [age_group, hd_index])
}

/// Total over every granular age group
pub fn total_all_ages(conn: &Connection, year: i64, sex: &Category, hd_index: &Category) -> Result<i64> {
    expect_kind(sex, CategoryKind::Sex)?;
    expect_kind(hd_index, CategoryKind::HdIndex)?;
    sum_over(conn, CategoryKind::AgeGroup, year, [sex, hd_index])
}

/// Total over every granular HD-index rating
pub fn total_all_hdi(conn: &Connection, year: i64, age_group: &Category, sex: &Category) -> Result<i64> {
    expect_kind(age_group, CategoryKind::AgeGroup)?;
    expect_kind(sex, CategoryKind::Sex)?;
    sum_over(conn, CategoryKind::HdIndex, year, [age_group, sex])
}

/// Value per granular sex; the parts that `total_both_sexes` adds up
pub fn breakdown_by_sex(
    conn: &Connection,
    year: i64,
    age_group: &Category,
    hd_index: &Category,
) -> Result<BTreeMap<String, i64>> {
    expect_kind(age_group, CategoryKind::AgeGroup)?;
    expect_kind(hd_index, CategoryKind::HdIndex)?;

    let mut stmt = conn.prepare(
        "SELECT x.name, s.value
         FROM demographic_statistics s
         JOIN sexes x ON x.id = s.sex_id
         WHERE s.year = ?1 AND s.age_group_id = ?2 AND s.hd_index_id = ?3 AND x.is_aggregate = 0",
    )?;

    let breakdown = stmt
        .query_map(params![year, age_group.id, hd_index.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(breakdown)
}

// ============================================================================
// PRESENTATION
// ============================================================================

/// What the read API returns per statistic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedStatistic {
    pub year: i64,
    pub age_group: String,
    pub sex: String,
    pub hd_index: String,
    pub value: i64,
    pub total_both_sexes: i64,
}

/// Attach `total_both_sexes` to each statistic, one query per distinct
/// (year, age group, HD index)
pub fn present(conn: &Connection, stats: &[Statistic]) -> Result<Vec<AggregatedStatistic>> {
    let mut totals: HashMap<(i64, i64, i64), i64> = HashMap::new();
    let mut out = Vec::with_capacity(stats.len());

    for stat in stats {
        let key = (stat.year, stat.age_group.id, stat.hd_index.id);
        let total = match totals.get(&key) {
            Some(total) => *total,
            None => {
                let total = total_both_sexes(conn, stat.year, &stat.age_group, &stat.hd_index)?;
                totals.insert(key, total);
                total
            }
        };

        out.push(AggregatedStatistic {
            year: stat.year,
            age_group: stat.age_group.name.clone(),
            sex: stat.sex.name.clone(),
            hd_index: stat.hd_index.name.clone(),
            value: stat.value,
            total_both_sexes: total,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{setup_database, DemographicsRepository, SqliteRepository};
    use crate::entities::NewStatistic;

    const HIGH: &str = "High Human Development Index (HDI)";
    const LOW: &str = "Low Human Development Index (HDI)";

    struct Fixture {
        conn: Connection,
    }

    impl Fixture {
        fn new() -> Self {
            let conn = Connection::open_in_memory().unwrap();
            setup_database(&conn).unwrap();
            Fixture { conn }
        }

        fn cat(&self, kind: CategoryKind, name: &str) -> Category {
            SqliteRepository::new(&self.conn).get_or_create_category(kind, name).unwrap()
        }

        fn put(&self, year: i64, age: &str, sex: &str, hdi: &str, value: i64) {
            let stat = NewStatistic::new(
                year,
                &self.cat(CategoryKind::AgeGroup, age),
                &self.cat(CategoryKind::Sex, sex),
                &self.cat(CategoryKind::HdIndex, hdi),
                value,
            )
            .unwrap();
            SqliteRepository::new(&self.conn).upsert_statistic(&stat).unwrap();
        }

        /// Male/Female x 0-4/5-9, High HDI, 2023
        fn seeded() -> Self {
            let f = Fixture::new();
            f.put(2023, "0 - 4 years", "Male", HIGH, 1000);
            f.put(2023, "0 - 4 years", "Female", HIGH, 900);
            f.put(2023, "5 - 9 years", "Male", HIGH, 800);
            f.put(2023, "5 - 9 years", "Female", HIGH, 700);
            f
        }
    }

    #[test]
    fn test_total_both_sexes() {
        let f = Fixture::seeded();
        let age = f.cat(CategoryKind::AgeGroup, "0 - 4 years");
        let hdi = f.cat(CategoryKind::HdIndex, HIGH);

        assert_eq!(total_both_sexes(&f.conn, 2023, &age, &hdi).unwrap(), 1900);
    }

    #[test]
    fn test_total_all_ages() {
        let f = Fixture::seeded();
        let male = f.cat(CategoryKind::Sex, "Male");
        let hdi = f.cat(CategoryKind::HdIndex, HIGH);

        assert_eq!(total_all_ages(&f.conn, 2023, &male, &hdi).unwrap(), 1800);
    }

    #[test]
    fn test_total_all_hdi() {
        let f = Fixture::seeded();
        f.put(2023, "0 - 4 years", "Male", LOW, 500);
        let age = f.cat(CategoryKind::AgeGroup, "0 - 4 years");
        let male = f.cat(CategoryKind::Sex, "Male");

        assert_eq!(total_all_hdi(&f.conn, 2023, &age, &male).unwrap(), 1500);
    }

    #[test]
    fn test_totals_exclude_stored_aggregate_members() {
        let f = Fixture::seeded();
        // Aggregate rows are never imported, but a hand-inserted one must not double count
        f.put(2023, "0 - 4 years", "Both sexes", HIGH, 1900);
        f.put(2023, "All ages", "Male", HIGH, 1800);
        f.put(2023, "0 - 4 years", "Male", "Human Development Index (HDI) - All ratings", 1000);

        let age = f.cat(CategoryKind::AgeGroup, "0 - 4 years");
        let male = f.cat(CategoryKind::Sex, "Male");
        let hdi = f.cat(CategoryKind::HdIndex, HIGH);

        assert_eq!(total_both_sexes(&f.conn, 2023, &age, &hdi).unwrap(), 1900);
        assert_eq!(total_all_ages(&f.conn, 2023, &male, &hdi).unwrap(), 1800);
        assert_eq!(total_all_hdi(&f.conn, 2023, &age, &male).unwrap(), 1000);

        let breakdown = breakdown_by_sex(&f.conn, 2023, &age, &hdi).unwrap();
        assert!(!breakdown.contains_key("Both sexes"));
    }

    #[test]
    fn test_no_matching_rows_is_zero() {
        let f = Fixture::seeded();
        let age = f.cat(CategoryKind::AgeGroup, "0 - 4 years");
        let hdi = f.cat(CategoryKind::HdIndex, HIGH);

        assert_eq!(total_both_sexes(&f.conn, 1999, &age, &hdi).unwrap(), 0);
    }

    #[test]
    fn test_breakdown_by_sex() {
        let f = Fixture::seeded();
        let age = f.cat(CategoryKind::AgeGroup, "0 - 4 years");
        let hdi = f.cat(CategoryKind::HdIndex, HIGH);

        let breakdown = breakdown_by_sex(&f.conn, 2023, &age, &hdi).unwrap();

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown["Male"], 1000);
        assert_eq!(breakdown["Female"], 900);
    }

    #[test]
    fn test_breakdown_sums_to_total() {
        let f = Fixture::seeded();
        f.put(2023, "5 - 9 years", "Unknown", HIGH, 42);

        for age_name in ["0 - 4 years", "5 - 9 years", "10 - 14 years"] {
            let age = f.cat(CategoryKind::AgeGroup, age_name);
            let hdi = f.cat(CategoryKind::HdIndex, HIGH);

            let breakdown = breakdown_by_sex(&f.conn, 2023, &age, &hdi).unwrap();
            let total = total_both_sexes(&f.conn, 2023, &age, &hdi).unwrap();
            assert_eq!(breakdown.values().sum::<i64>(), total, "age group {}", age_name);
        }
    }

    #[test]
    fn test_wrong_category_kind_is_rejected() {
        let f = Fixture::seeded();
        let age = f.cat(CategoryKind::AgeGroup, "0 - 4 years");
        let male = f.cat(CategoryKind::Sex, "Male");
        let hdi = f.cat(CategoryKind::HdIndex, HIGH);

        let err = total_both_sexes(&f.conn, 2023, &male, &hdi).unwrap_err();
        assert_eq!(err.to_string(), "Expected Age Group category, got Sex 'Male'");

        assert!(total_all_ages(&f.conn, 2023, &age, &hdi).is_err());
        assert!(total_all_hdi(&f.conn, 2023, &age, &hdi).is_err());
        assert!(breakdown_by_sex(&f.conn, 2023, &hdi, &age).is_err());
    }

    #[test]
    fn test_present_attaches_total() {
        let f = Fixture::seeded();
        let male = f.cat(CategoryKind::Sex, "Male");
        let stats: Vec<Statistic> = crate::filter::filter_statistics(
            &f.conn,
            &crate::filter::StatisticFilter::new().with_sex(male),
        )
        .unwrap();

        let presented = present(&f.conn, &stats).unwrap();

        assert_eq!(presented.len(), 2);
        let young = presented.iter().find(|p| p.age_group == "0 - 4 years").unwrap();
        assert_eq!(young.value, 1000);
        assert_eq!(young.total_both_sexes, 1900);
        let older = presented.iter().find(|p| p.age_group == "5 - 9 years").unwrap();
        assert_eq!(older.total_both_sexes, 1500);
    }
}
