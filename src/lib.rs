// HDI Demographics - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod db;
pub mod entities;
pub mod normalizer;     // CSV row → canonical labels
pub mod importer;       // Transactional, idempotent CSV import
pub mod aggregation;    // Totals over granular rows only
pub mod filter;         // Validated read queries
pub mod summary;        // Dashboard / `show` summaries
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use db::{
    Event, DemographicsRepository, SqliteRepository, UpsertOutcome,
    setup_database, open_database, find_category, list_categories,
    count_categories, count_statistics, clear_statistics,
    insert_event, get_events_for_entity, get_events_by_type,
};
pub use entities::{
    Category, CategoryKind, CategoryRef,
    NewStatistic, Statistic, StatisticError,
    ALL_AGES, BOTH_SEXES, ALL_HDI_RATINGS,
};
pub use normalizer::{normalize, is_aggregate_row, NormalizedRow, RawRow, RejectReason};
pub use importer::{
    DemographicsImporter, ImportReport, RowOutcome,
    SourceFetcher, HttpFetcher, FetchedSource, SourceData, CsvRecord, process_row, read_rows,
};
pub use aggregation::{
    total_both_sexes, total_all_ages, total_all_hdi, breakdown_by_sex,
    present, AggregatedStatistic,
};
pub use filter::{filter_statistics, FilterError, StatisticFilter, StatisticOrdering};
pub use summary::{DataSummary, FilterOptions};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
