// 📥 Importer - CSV rows → categories + upserted statistics
//
// One import call = one SQLite transaction. Inside it each row gets its own
// savepoint, so a row that fails to persist is rolled back alone and the rest
// of the batch still commits.

use crate::db::{insert_event, DemographicsRepository, Event, SqliteRepository, UpsertOutcome};
use crate::entities::{check_statistic, CategoryKind, NewStatistic};
use crate::normalizer::{is_aggregate_row, normalize, RawRow, RejectReason};
use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const ACTOR: &str = "csv_importer";

// ============================================================================
// OUTCOMES
// ============================================================================

/// What happened to one input row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Imported { created: bool },
    SkippedAggregate,
    Rejected(RejectReason),
}

/// Summary handed back to every caller of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub success: bool,
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub imported_rows: usize,
    pub error_rows: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportReport {
    /// Source-level failure: nothing was imported
    pub fn failed(error: impl Into<String>) -> Self {
        ImportReport {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn record(&mut self, row_num: usize, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Imported { .. } => self.imported_rows += 1,
            RowOutcome::SkippedAggregate => self.skipped_rows += 1,
            RowOutcome::Rejected(_) => self.error_rows.push(row_num),
        }
    }

    pub fn summary(&self) -> String {
        match &self.error {
            Some(err) => format!("Import failed: {}", err),
            None => format!(
                "Total: {}, Skipped (aggregated): {}, Imported: {}, Errors: {}",
                self.total_rows,
                self.skipped_rows,
                self.imported_rows,
                self.error_rows.len()
            ),
        }
    }
}

// ============================================================================
// ROW PROCESSING
// ============================================================================

/// Classify and persist one row through the repository.
/// Never fails: every problem becomes `RowOutcome::Rejected`.
pub fn process_row<R: DemographicsRepository + ?Sized>(repo: &R, row_num: usize, row: &RawRow) -> RowOutcome {
    if is_aggregate_row(row) {
        log::debug!("Row {}: aggregate row skipped", row_num);
        return RowOutcome::SkippedAggregate;
    }

    let normalized = match normalize(row) {
        Ok(n) => n,
        Err(reason) => {
            log::warn!("Row {}: {}", row_num, reason);
            return RowOutcome::Rejected(reason);
        }
    };

    // Domain check runs before any category is created
    if let Err(err) = check_statistic(normalized.year, normalized.value) {
        let reason = RejectReason::Invalid(err);
        log::warn!("Row {}: {}", row_num, reason);
        return RowOutcome::Rejected(reason);
    }

    let persist = || -> Result<std::result::Result<UpsertOutcome, RejectReason>> {
        let age_group = repo.get_or_create_category(CategoryKind::AgeGroup, &normalized.age_group)?;
        let sex = repo.get_or_create_category(CategoryKind::Sex, &normalized.sex)?;
        let hd_index = repo.get_or_create_category(CategoryKind::HdIndex, &normalized.hd_index)?;

        let stat = match NewStatistic::new(normalized.year, &age_group, &sex, &hd_index, normalized.value) {
            Ok(stat) => stat,
            Err(err) => return Ok(Err(RejectReason::Invalid(err))),
        };

        Ok(Ok(repo.upsert_statistic(&stat)?))
    };

    match persist() {
        Ok(Ok(outcome)) => RowOutcome::Imported {
            created: outcome == UpsertOutcome::Created,
        },
        Ok(Err(reason)) => {
            log::warn!("Row {}: {}", row_num, reason);
            RowOutcome::Rejected(reason)
        }
        Err(err) => {
            log::error!("Error saving row {}: {:#}", row_num, err);
            RowOutcome::Rejected(RejectReason::Persistence(format!("{:#}", err)))
        }
    }
}

// ============================================================================
// SOURCES
// ============================================================================

/// Raw bytes plus where they came from
#[derive(Debug, Clone)]
pub struct SourceData {
    pub description: String,
    pub bytes: Vec<u8>,
}

impl SourceData {
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Response of a remote fetch
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedSource {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote source capability, swappable in tests
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedSource>;
}

/// Blocking HTTP fetcher with a bounded request timeout.
/// The client lives only for one fetch, so it is never created or dropped
/// on an async runtime thread.
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        HttpFetcher { timeout }
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedSource> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;

        let resp = client
            .get(url)
            .send()
            .with_context(|| format!("Failed to reach {}", url))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().context("Failed to read response body")?.to_vec();
        Ok(FetchedSource { status, body })
    }
}

/// One CSV record: header-keyed fields, or the reason it cannot be read
pub type CsvRecord = std::result::Result<RawRow, RejectReason>;

fn decode_record(headers: &[String], record: &csv::ByteRecord) -> CsvRecord {
    headers
        .iter()
        .zip(record.iter())
        .map(|(header, bytes)| match std::str::from_utf8(bytes) {
            Ok(value) => Ok((header.clone(), value.to_string())),
            Err(_) => Err(RejectReason::InvalidEncoding(header.clone())),
        })
        .collect()
}

/// Parse CSV bytes into header-keyed rows. A record with invalid UTF-8
/// becomes a rejected entry and keeps its position.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<CsvRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (line_num, result) in rdr.byte_records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;
        rows.push(decode_record(&headers, &record));
    }

    Ok(rows)
}

// ============================================================================
// IMPORTER
// ============================================================================

pub struct DemographicsImporter {
    fetcher: Box<dyn SourceFetcher>,
}

impl DemographicsImporter {
    pub fn new(fetcher: Box<dyn SourceFetcher>) -> Self {
        DemographicsImporter { fetcher }
    }

    /// Importer with the real HTTP fetcher
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Box::new(HttpFetcher::new(timeout)))
    }

    /// Import already-parsed rows. All successfully processed rows commit
    /// together; an unexpected storage failure rolls the whole batch back.
    pub fn import_rows(&self, conn: &mut Connection, rows: &[RawRow]) -> ImportReport {
        let rows = rows.iter().map(Ok::<&RawRow, &RejectReason>);
        match self.run_batch(conn, rows, None) {
            Ok(report) => report,
            Err(err) => {
                log::error!("Import rolled back: {:#}", err);
                ImportReport::failed(format!("{:#}", err))
            }
        }
    }

    /// Import CSV from any reader
    pub fn import_from_reader<R: Read>(&self, conn: &mut Connection, description: &str, mut reader: R) -> ImportReport {
        let mut bytes = Vec::new();
        if let Err(err) = reader.read_to_end(&mut bytes) {
            log::error!("Error reading {}: {}", description, err);
            return ImportReport::failed(err.to_string());
        }
        self.import_source(
            conn,
            SourceData {
                description: description.to_string(),
                bytes,
            },
        )
    }

    /// Import a local CSV file
    pub fn import_from_file(&self, conn: &mut Connection, file_path: &Path) -> ImportReport {
        if !file_path.exists() {
            return ImportReport::failed(format!("File not found: {}", file_path.display()));
        }

        match std::fs::read(file_path) {
            Ok(bytes) => self.import_source(
                conn,
                SourceData {
                    description: format!("file:{}", file_path.display()),
                    bytes,
                },
            ),
            Err(err) => {
                log::error!("Error importing from file: {}", err);
                ImportReport::failed(format!("Failed to read {}: {}", file_path.display(), err))
            }
        }
    }

    /// Import a CSV served over HTTP(S)
    pub fn import_from_url(&self, conn: &mut Connection, url: &str) -> ImportReport {
        match self.fetch_source(url) {
            Ok(source) => self.import_source(conn, source),
            Err(report) => report,
        }
    }

    /// Download a remote CSV without touching the database. A failed fetch
    /// comes back as the report the import would have returned.
    pub fn fetch_source(&self, url: &str) -> std::result::Result<SourceData, ImportReport> {
        let fetched = match self.fetcher.fetch(url) {
            Ok(fetched) => fetched,
            Err(err) => {
                log::error!("Error importing from URL: {:#}", err);
                return Err(ImportReport::failed(format!("{:#}", err)));
            }
        };

        if !fetched.is_success() {
            return Err(ImportReport::failed(format!(
                "Failed to fetch CSV from URL: HTTP {}",
                fetched.status
            )));
        }

        Ok(SourceData {
            description: format!("url:{}", url),
            bytes: fetched.body,
        })
    }

    /// Parse and import source bytes that are already in memory
    pub fn import_source(&self, conn: &mut Connection, source: SourceData) -> ImportReport {
        let rows = match read_rows(source.bytes.as_slice()) {
            Ok(rows) => rows,
            Err(err) => {
                log::error!("Error reading {}: {:#}", source.description, err);
                return ImportReport::failed(format!("{:#}", err));
            }
        };

        match self.run_batch(conn, rows.iter().map(|r| r.as_ref()), Some(&source)) {
            Ok(report) => report,
            Err(err) => {
                log::error!("Import of {} rolled back: {:#}", source.description, err);
                ImportReport::failed(format!("{:#}", err))
            }
        }
    }

    fn run_batch<'a, I>(&self, conn: &mut Connection, rows: I, source: Option<&SourceData>) -> Result<ImportReport>
    where
        I: IntoIterator<Item = std::result::Result<&'a RawRow, &'a RejectReason>>,
    {
        let started = std::time::Instant::now();
        let mut tx = conn.transaction().context("Failed to begin import transaction")?;

        let mut report = ImportReport {
            success: true,
            ..Default::default()
        };

        for (i, row) in rows.into_iter().enumerate() {
            let row_num = i + 1;
            report.total_rows += 1;

            let outcome = match row {
                Ok(row) => {
                    let sp = tx.savepoint().context("Failed to open row savepoint")?;
                    let outcome = process_row(&SqliteRepository::new(&sp), row_num, row);
                    if let RowOutcome::Imported { .. } = outcome {
                        sp.commit()?;
                    }
                    // Dropped savepoints roll back
                    outcome
                }
                Err(reason) => {
                    log::warn!("Row {}: {}", row_num, reason);
                    RowOutcome::Rejected(reason.clone())
                }
            };
            report.record(row_num, &outcome);
        }

        let entity_id = source.map(|s| s.description.as_str()).unwrap_or("rows");
        let event = Event::new(
            "import_completed",
            "import",
            entity_id,
            serde_json::json!({
                "digest": source.map(|s| s.digest()),
                "total_rows": report.total_rows,
                "skipped_rows": report.skipped_rows,
                "imported_rows": report.imported_rows,
                "error_rows": report.error_rows,
            }),
            ACTOR,
        );
        insert_event(&tx, &event)?;

        tx.commit().context("Failed to commit import")?;

        log::info!(
            "Imported {} ({:.2}s): {}",
            entity_id,
            started.elapsed().as_secs_f64(),
            report.summary()
        );
        Ok(report)
    }
}
