//! # Bulk Import
//!
//! Loads phones and products from a CSV export of the shop's spreadsheet.
//!
//! ```text
//! bytes ──► parse_sheet(kind) ──► ImportSheet ──► import_phones / import_products
//!              │ header check                        │ one row = one create
//!              ▼                                     ▼
//!          Validation error                  ImportReport { created, failed }
//! ```
//!
//! Rows are independent: a bad row is reported with its sheet line number
//! (the header is line 1) and the rest still load.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use swapsync_core::money::Money;
use swapsync_core::{Actor, PhoneSpecs, PhoneStatus, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::CatalogRepository;
use crate::repository::phone::{NewPhone, PhoneRepository};
use crate::repository::product::{NewProduct, ProductRepository};

/// Columns every phone sheet must carry.
pub const PHONE_COLUMNS: &[&str] = &["brand", "model", "condition", "value", "status"];

/// Columns every product sheet must carry.
pub const PRODUCT_COLUMNS: &[&str] = &["name", "category", "cost_price", "selling_price", "quantity"];

/// Optional phone columns copied into `specs`.
const SPEC_COLUMNS: &[&str] = &["cpu", "ram", "storage", "battery", "battery_health", "color"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    Phones,
    Products,
}

impl SheetKind {
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            SheetKind::Phones => PHONE_COLUMNS,
            SheetKind::Products => PRODUCT_COLUMNS,
        }
    }
}

/// A parsed sheet whose header carries the required columns.
#[derive(Debug, Clone)]
pub struct ImportSheet {
    pub kind: SheetKind,
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl ImportSheet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows paired with their sheet line numbers.
    fn lines(&self) -> impl Iterator<Item = (usize, SheetRow<'_>)> {
        self.rows.iter().enumerate().map(move |(i, record)| {
            (
                i + 2,
                SheetRow {
                    headers: &self.headers,
                    record,
                },
            )
        })
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Ids of the rows created.
    pub created: Vec<i64>,
    /// `(line, reason)` for each rejected row.
    pub failed: Vec<(usize, String)>,
}

/// Parses CSV bytes and checks the header.
///
/// Header names are matched case-insensitively; surrounding spaces are
/// ignored.
pub fn parse_sheet(kind: SheetKind, bytes: &[u8]) -> DbResult<ImportSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(sheet_error)?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase().replace(' ', "_"))
        .collect();

    let missing: Vec<&str> = kind
        .required_columns()
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == column))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::required(format!("columns {}", missing.join(", "))).into());
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(sheet_error)?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(record);
    }

    Ok(ImportSheet { kind, headers, rows })
}

fn sheet_error(err: csv::Error) -> DbError {
    ValidationError::InvalidFormat {
        field: "sheet".to_string(),
        reason: err.to_string(),
    }
    .into()
}

// =============================================================================
// Importer
// =============================================================================

/// Creates rows from a parsed sheet through the normal repositories.
#[derive(Debug, Clone)]
pub struct Importer {
    pool: SqlitePool,
}

impl Importer {
    pub fn new(pool: SqlitePool) -> Self {
        Importer { pool }
    }

    pub async fn import_phones(&self, actor: &Actor, sheet: &ImportSheet) -> DbResult<ImportReport> {
        expect_kind(sheet, SheetKind::Phones)?;
        let phones = PhoneRepository::new(self.pool.clone());
        let mut report = ImportReport::default();

        for (line, row) in sheet.lines() {
            let outcome = async {
                let (new, status) = phone_from_row(&row)?;
                let phone = phones.create_phone(actor, new).await?;
                if status != PhoneStatus::Available {
                    phones.set_status(actor, phone.id, status).await?;
                }
                Ok::<_, DbError>(phone.id)
            }
            .await;
            record(&mut report, line, outcome)?;
        }

        info!(created = report.created.len(), failed = report.failed.len(), "Imported phones");
        Ok(report)
    }

    pub async fn import_products(&self, actor: &Actor, sheet: &ImportSheet) -> DbResult<ImportReport> {
        expect_kind(sheet, SheetKind::Products)?;
        let catalog = CatalogRepository::new(self.pool.clone());
        let products = ProductRepository::new(self.pool.clone());
        let mut report = ImportReport::default();

        for (line, row) in sheet.lines() {
            let outcome = async {
                let category = catalog.find_or_create_category(row.required("category")?).await?;
                let new = product_from_row(&row, category.id)?;
                let product = products.create_product(actor, new).await?;
                Ok::<_, DbError>(product.id)
            }
            .await;
            record(&mut report, line, outcome)?;
        }

        info!(created = report.created.len(), failed = report.failed.len(), "Imported products");
        Ok(report)
    }
}

fn expect_kind(sheet: &ImportSheet, kind: SheetKind) -> DbResult<()> {
    if sheet.kind != kind {
        return Err(ValidationError::InvalidFormat {
            field: "sheet".to_string(),
            reason: format!("expected a {:?} sheet", kind).to_lowercase(),
        }
        .into());
    }
    Ok(())
}

/// Row failures go into the report; connection-level failures abort.
fn record(report: &mut ImportReport, line: usize, outcome: DbResult<i64>) -> DbResult<()> {
    match outcome {
        Ok(id) => report.created.push(id),
        Err(err @ (DbError::Domain(_) | DbError::NotFound { .. } | DbError::UniqueViolation { .. })) => {
            warn!(line, error = %err, "Skipped import row");
            report.failed.push((line, err.to_string()));
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

// =============================================================================
// Row Mapping
// =============================================================================

struct SheetRow<'a> {
    headers: &'a [String],
    record: &'a csv::StringRecord,
}

impl<'a> SheetRow<'a> {
    /// Non-empty cell under `column`.
    fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.record.get(index).filter(|cell| !cell.is_empty())
    }

    fn required(&self, column: &str) -> Result<&'a str, ValidationError> {
        self.get(column).ok_or_else(|| ValidationError::required(column))
    }

    fn amount(&self, column: &str) -> Result<Option<Money>, ValidationError> {
        self.get(column).map(|cell| parse_amount(column, cell)).transpose()
    }

    fn integer(&self, column: &str) -> Result<Option<i64>, ValidationError> {
        self.get(column)
            .map(|cell| {
                let cleaned = cell.replace(',', "");
                // Spreadsheets export whole numbers as "5.0".
                Decimal::from_str(&cleaned)
                    .ok()
                    .filter(|d| d.fract().is_zero())
                    .and_then(|d| i64::try_from(d).ok())
                    .ok_or_else(|| invalid(column, cell))
            })
            .transpose()
    }
}

fn invalid(column: &str, cell: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: column.to_string(),
        reason: format!("'{}' is not a number", cell),
    }
}

/// Accepts `1,250.50`, `GHS 1250.5` and plain `1250`.
fn parse_amount(column: &str, cell: &str) -> Result<Money, ValidationError> {
    let cleaned: String = cell
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c.is_whitespace())
        .chars()
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(cleaned.trim())
        .ok()
        .and_then(Money::from_decimal)
        .ok_or_else(|| invalid(column, cell))
}

fn phone_from_row(row: &SheetRow<'_>) -> Result<(NewPhone, PhoneStatus), ValidationError> {
    let value = row.amount("value")?.ok_or_else(|| ValidationError::required("value"))?;
    let cost_price = row.amount("cost_price")?.unwrap_or(value);
    let status = PhoneStatus::from_str(row.required("status")?)?;

    let mut specs = PhoneSpecs::new();
    for column in SPEC_COLUMNS {
        if let Some(cell) = row.get(column) {
            specs.insert(column.to_string(), cell.to_string());
        }
    }

    let new = NewPhone {
        brand: row.required("brand")?.to_string(),
        model: row.required("model")?.to_string(),
        imei: row.get("imei").map(str::to_string),
        condition: row.required("condition")?.to_string(),
        value,
        cost_price,
        specs,
        category_id: None,
    };
    Ok((new, status))
}

fn product_from_row(row: &SheetRow<'_>, category_id: i64) -> Result<NewProduct, ValidationError> {
    Ok(NewProduct {
        name: row.required("name")?.to_string(),
        description: row.get("description").map(str::to_string),
        sku: row.get("sku").map(str::to_string),
        barcode: row.get("barcode").map(str::to_string),
        category_id,
        brand: row.get("brand").map(str::to_string),
        cost_price: row.amount("cost_price")?.ok_or_else(|| ValidationError::required("cost_price"))?,
        selling_price: row
            .amount("selling_price")?
            .ok_or_else(|| ValidationError::required("selling_price"))?,
        quantity: row.integer("quantity")?.ok_or_else(|| ValidationError::required("quantity"))?,
        min_stock_level: row.integer("min_stock_level")?.unwrap_or(0),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
