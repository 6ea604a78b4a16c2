// Entity Models
//
// - Category: one member of a taxonomy (age group, sex, HD index)
// - Statistic: one population count for a unique combination of the three

pub mod category;
pub mod statistic;

pub use category::{Category, CategoryKind, CategoryRef, ALL_AGES, ALL_HDI_RATINGS, BOTH_SEXES};
pub use statistic::{check as check_statistic, NewStatistic, Statistic, StatisticError};
