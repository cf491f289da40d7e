//! Bulk card import from CSV.
//!
//! Parsing and validation are pure. Applying an import writes every row in
//! one transaction, with a savepoint per row so a row the database rejects
//! only loses that row. The `csv_imports` run record is written outside that
//! transaction so a failed run is still on file.

use chrono::{Datelike, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Nullable, Text};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::{CardDraft, ColumnMapping, DuplicateAction, ImportField, ImportStatus, RawRow};
use std::io::Read;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{DbPool, PoolError};
use crate::models::*;
use crate::schema::*;

const DUPLICATE_QUERY: &str = "SELECT id, card_name, set_name, card_number, price_nzd, quantity \
     FROM cards \
     WHERE lower(card_name) = lower($1) \
     AND lower(set_name) IS NOT DISTINCT FROM lower($2) \
     AND card_number IS NOT DISTINCT FROM $3 \
     LIMIT 1";

const TEMPLATE_SAMPLE: [&str; 14] = [
    "Michael Jordan Rookie",
    "1986 Fleer",
    "57",
    "1986",
    "basketball",
    "Michael Jordan",
    "near_mint",
    "125.00",
    "1",
    "rare",
    "yes",
    "PSA",
    "8",
    "Iconic rookie card in excellent condition",
];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Database(#[from] DieselError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A row that passed validation.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedRow {
    pub row_number: usize,
    pub draft: CardDraft,
    pub raw: RawRow,
}

/// A row that was rejected, as kept in the run's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub errors: Vec<String>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedCsv {
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub row: usize,
    pub existing: ExistingCard,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    pub duplicates: Vec<DuplicateMatch>,
    pub unique_rows: Vec<usize>,
    /// Rows whose duplicate lookup failed and were treated as unique.
    pub needs_review: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub import_id: Uuid,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_rows: usize,
    pub errors: Vec<RowError>,
    pub needs_review: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportTemplate {
    pub headers: Vec<&'static str>,
    pub sample: Vec<&'static str>,
    pub csv: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Written,
    Skipped,
}

#[derive(Default)]
struct Tally {
    successful: usize,
    failed: usize,
    skipped: usize,
    errors: Vec<RowError>,
    needs_review: Vec<usize>,
}

#[derive(Clone)]
pub struct ImportService {
    pool: DbPool,
}

impl ImportService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Reads and validates every data row. Rows are numbered from 1.
    pub fn parse<R: Read>(reader: R, mapping: &ColumnMapping) -> Result<ParsedCsv, ImportError> {
        let current_year = Utc::now().year();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();

        let mut parsed = ParsedCsv::default();
        for (index, record) in reader.records().enumerate() {
            let row = index + 1;
            parsed.total_rows += 1;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    parsed.errors.push(RowError {
                        row,
                        errors: vec![format!("Unreadable row: {}", e)],
                        data: serde_json::Value::Null,
                    });
                    continue;
                }
            };

            let raw = mapping.map_record(headers.iter().zip(record.iter()));
            match raw.validate(current_year) {
                Ok(draft) => parsed.rows.push(ParsedRow {
                    row_number: row,
                    draft,
                    raw,
                }),
                Err(errors) => parsed.errors.push(RowError {
                    row,
                    errors,
                    data: raw.to_json(),
                }),
            }
        }

        Ok(parsed)
    }

    /// Preview: which valid rows already exist in inventory. Nothing is written.
    pub async fn detect_duplicates(&self, rows: &[ParsedRow]) -> Result<DuplicateReport, ImportError> {
        let mut conn = self.pool.get().await?;
        let mut report = DuplicateReport::default();

        for row in rows {
            match lookup_duplicate(&mut conn, &row.draft).await {
                Ok(Some(existing)) => report.duplicates.push(DuplicateMatch {
                    row: row.row_number,
                    existing,
                }),
                Ok(None) => report.unique_rows.push(row.row_number),
                Err(e) if is_row_level(&e) => {
                    warn!("Duplicate check failed for row {}: {}", row.row_number, e);
                    report.unique_rows.push(row.row_number);
                    report.needs_review.push(row.row_number);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }

    /// Applies a parsed CSV to inventory.
    pub async fn import_cards(
        &self,
        user_id: Uuid,
        filename: &str,
        parsed: &ParsedCsv,
        action: DuplicateAction,
    ) -> Result<ImportSummary, ImportError> {
        let import_id = Uuid::new_v4();
        let total_rows = parsed.total_rows;

        {
            let mut conn = self.pool.get().await?;
            let run = NewCsvImport {
                id: import_id,
                user_id,
                filename: filename.to_string(),
                total_rows: to_count(total_rows),
                status: ImportStatus::Processing.as_str().to_string(),
            };
            diesel::insert_into(csv_imports::table)
                .values(&run)
                .execute(&mut conn)
                .await?;
        }

        info!(
            "Import {} started by {}: {} rows from {} ({} duplicates policy)",
            import_id,
            user_id,
            total_rows,
            filename,
            action.as_str()
        );

        match self.apply(import_id, parsed, action).await {
            Ok(tally) => {
                info!(
                    "Import {} completed: {} successful, {} failed, {} skipped",
                    import_id, tally.successful, tally.failed, tally.skipped
                );
                Ok(ImportSummary {
                    import_id,
                    successful: tally.successful,
                    failed: tally.failed,
                    skipped: tally.skipped,
                    total_rows,
                    errors: tally.errors,
                    needs_review: tally.needs_review,
                })
            }
            Err(e) => {
                error!("Import {} failed: {}", import_id, e);
                self.mark_failed(import_id, &e).await;
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        import_id: Uuid,
        parsed: &ParsedCsv,
        action: DuplicateAction,
    ) -> Result<Tally, ImportError> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, ImportError, _>(|conn| {
            Box::pin(async move {
                let mut tally = Tally {
                    failed: parsed.errors.len(),
                    errors: parsed.errors.clone(),
                    ..Tally::default()
                };

                // Rows are matched against inventory as it was before this
                // import, so repeated new rows in one file are all inserted.
                let mut matches = Vec::with_capacity(parsed.rows.len());
                for row in &parsed.rows {
                    let existing = match lookup_duplicate(conn, &row.draft).await {
                        Ok(existing) => existing,
                        Err(e) if is_row_level(&e) => {
                            warn!("Duplicate check failed for row {}: {}", row.row_number, e);
                            tally.needs_review.push(row.row_number);
                            None
                        }
                        Err(e) => return Err(e.into()),
                    };
                    matches.push(existing);
                }

                for (row, existing) in parsed.rows.iter().zip(&matches) {
                    match write_row(conn, &row.draft, existing.as_ref(), action).await {
                        Ok(RowOutcome::Written) => tally.successful += 1,
                        Ok(RowOutcome::Skipped) => tally.skipped += 1,
                        Err(e) if is_row_level(&e) => {
                            warn!("Import {} row {} failed: {}", import_id, row.row_number, e);
                            tally.failed += 1;
                            tally.errors.push(RowError {
                                row: row.row_number,
                                errors: vec![e.to_string()],
                                data: row.raw.to_json(),
                            });
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                tally.errors.sort_by_key(|entry| entry.row);

                let error_log = serde_json::to_value(&tally.errors)
                    .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));
                diesel::update(csv_imports::table.find(import_id))
                    .set((
                        csv_imports::successful_rows.eq(to_count(tally.successful)),
                        csv_imports::failed_rows.eq(to_count(tally.failed)),
                        csv_imports::duplicates_skipped.eq(to_count(tally.skipped)),
                        csv_imports::status.eq(ImportStatus::Completed.as_str()),
                        csv_imports::error_log.eq(error_log),
                        csv_imports::completed_at.eq(Some(Utc::now())),
                    ))
                    .execute(conn)
                    .await?;

                Ok(tally)
            })
        })
        .await
    }

    async fn mark_failed(&self, import_id: Uuid, cause: &ImportError) {
        let result: Result<(), ImportError> = async {
            let mut conn = self.pool.get().await?;
            diesel::update(csv_imports::table.find(import_id))
                .set((
                    csv_imports::status.eq(ImportStatus::Failed.as_str()),
                    csv_imports::error_log.eq(serde_json::json!([{ "error": cause.to_string() }])),
                    csv_imports::completed_at.eq(Some(Utc::now())),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!("Could not mark import {} as failed: {}", import_id, e);
        }
    }

    /// Most recent runs first.
    pub async fn history(&self, limit: i64) -> Result<Vec<CsvImport>, ImportError> {
        let mut conn = self.pool.get().await?;
        let runs = csv_imports::table
            .order(csv_imports::created_at.desc())
            .limit(limit)
            .load::<CsvImport>(&mut conn)
            .await?;
        Ok(runs)
    }

    pub async fn find(&self, import_id: Uuid) -> Result<Option<CsvImport>, ImportError> {
        let mut conn = self.pool.get().await?;
        let run = csv_imports::table
            .find(import_id)
            .first::<CsvImport>(&mut conn)
            .await
            .optional()?;
        Ok(run)
    }

    pub fn template() -> ImportTemplate {
        let headers: Vec<&'static str> = ImportField::ALL.iter().map(ImportField::as_str).collect();
        let sample = TEMPLATE_SAMPLE.to_vec();
        let csv = format!("{}\n{}", headers.join(","), sample.join(","));
        ImportTemplate { headers, sample, csv }
    }
}

/// Failures that only concern one row: constraint violations, bad values,
/// a vanished target. Anything else means the connection or transaction is
/// unusable.
fn is_row_level(e: &DieselError) -> bool {
    match e {
        DieselError::DatabaseError(kind, _) => !matches!(kind, DatabaseErrorKind::ClosedConnection),
        DieselError::NotFound => true,
        _ => false,
    }
}

fn to_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or_else(|_| {
        warn!("Row count {} exceeds the csv_imports column range; storing {}", n, i32::MAX);
        i32::MAX
    })
}

async fn lookup_duplicate(
    conn: &mut AsyncPgConnection,
    draft: &CardDraft,
) -> Result<Option<ExistingCard>, DieselError> {
    let card_name = draft.card_name.clone();
    let set_name = draft.set_name.clone();
    let card_number = draft.card_number.clone();

    conn.transaction::<_, DieselError, _>(|conn| {
        Box::pin(async move {
            diesel::sql_query(DUPLICATE_QUERY)
                .bind::<Text, _>(card_name)
                .bind::<Nullable<Text>, _>(set_name)
                .bind::<Nullable<Text>, _>(card_number)
                .get_result::<ExistingCard>(conn)
                .await
                .optional()
        })
    })
    .await
}

async fn write_row(
    conn: &mut AsyncPgConnection,
    draft: &CardDraft,
    existing: Option<&ExistingCard>,
    action: DuplicateAction,
) -> Result<RowOutcome, DieselError> {
    let Some(existing) = existing else {
        let card = NewCard::from(draft);
        conn.transaction::<_, DieselError, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(cards::table)
                    .values(&card)
                    .execute(conn)
                    .await
            })
        })
        .await?;
        return Ok(RowOutcome::Written);
    };

    let card_id = existing.id;
    match action {
        DuplicateAction::Skip => Ok(RowOutcome::Skipped),
        DuplicateAction::Update => {
            let changes = CardOverwrite::from(draft);
            conn.transaction::<_, DieselError, _>(|conn| {
                Box::pin(async move {
                    diesel::update(cards::table.find(card_id))
                        .set(&changes)
                        .execute(conn)
                        .await
                })
            })
            .await?;
            Ok(RowOutcome::Written)
        }
        DuplicateAction::Merge => {
            let added = draft.quantity_or_default();
            conn.transaction::<_, DieselError, _>(|conn| {
                Box::pin(async move {
                    diesel::update(cards::table.find(card_id))
                        .set((
                            cards::quantity.eq(cards::quantity + added),
                            cards::updated_at.eq(Some(Utc::now())),
                        ))
                        .execute(conn)
                        .await
                })
            })
            .await?;
            Ok(RowOutcome::Written)
        }
    }
}
