//! CSV discovery, loading and writing.

use super::ColumnMapping;
use crate::error::{Result, WqError};
use crate::model::{conform_batch, observation_schema, DATE_COLUMN, OBSERVATION_COLUMNS, TIME_COLUMN};
use crate::security::SqlSecurity;
use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::prelude::CsvReadOptions;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Expands `patterns`, de-duplicates and sorts the matches, and drops `exclude`.
///
/// Finding no file at all is an error listing the patterns searched.
pub fn discover_csv_files(patterns: &[String], exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let excluded = exclude.map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()));

    let mut files = BTreeSet::new();
    for pattern in patterns {
        let matches = glob::glob(pattern).map_err(|e| {
            WqError::Configuration(format!("invalid source pattern '{pattern}': {e}"))
        })?;
        for entry in matches {
            let path = entry.map_err(|e| WqError::data_source("CSV", e.to_string()))?;
            if !path.is_file() {
                continue;
            }
            let resolved = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if excluded.as_ref() == Some(&resolved) {
                debug!(path = %path.display(), "skipping cleaned output");
                continue;
            }
            files.insert(path);
        }
    }

    if files.is_empty() {
        return Err(WqError::data_source(
            "CSV",
            format!(
                "no source CSV files found; looked in: {}",
                patterns.join(", ")
            ),
        ));
    }
    Ok(files.into_iter().collect())
}

/// Every header column typed as nullable `Utf8`, so no value can fail the read.
fn text_schema(path: &Path) -> Result<Schema> {
    let source_error = |e: &dyn std::fmt::Display| {
        WqError::data_source("CSV", format!("{}: {e}", path.display()))
    };
    let file = std::fs::File::open(path).map_err(|e| source_error(&e))?;
    let (header, _) = Format::default()
        .with_header(true)
        .infer_schema(file, Some(0))
        .map_err(|e| source_error(&e))?;
    Ok(Schema::new(
        header
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

fn projection(available: &HashSet<String>, mapping: &ColumnMapping, path: &Path) -> Result<String> {
    let mut columns = Vec::with_capacity(OBSERVATION_COLUMNS.len());
    for canonical in OBSERVATION_COLUMNS {
        let text = canonical == DATE_COLUMN || canonical == TIME_COLUMN;
        let sql_type = if text { "VARCHAR" } else { "DOUBLE" };
        let alias = SqlSecurity::escape_identifier(canonical)?;

        let source = mapping
            .source_for(canonical)
            .filter(|source| available.contains(*source));
        let expr = match source {
            Some(source) if text => format!("CAST({} AS {sql_type})", SqlSecurity::quote_identifier(source)?),
            Some(source) => format!("TRY_CAST({} AS {sql_type})", SqlSecurity::quote_identifier(source)?),
            None if ColumnMapping::is_required(canonical) => {
                return Err(WqError::data_source(
                    "CSV",
                    format!(
                        "{}: missing required column '{}'",
                        path.display(),
                        mapping.source_for(canonical).unwrap_or(canonical)
                    ),
                ))
            }
            None => format!("CAST(NULL AS {sql_type})"),
        };
        columns.push(format!("{expr} AS {alias}"));
    }
    Ok(columns.join(", "))
}

/// Reads `paths` and maps their columns onto the observation schema.
///
/// Files are read as text and numeric columns are `TRY_CAST`, so numeric
/// text that does not parse becomes null wherever it appears. The result is one batch
/// holding every file's rows in path order.
#[instrument(skip(paths, mapping), fields(files = paths.len()))]
pub async fn load_csv_files(paths: &[PathBuf], mapping: &ColumnMapping) -> Result<RecordBatch> {
    let ctx = SessionContext::new_with_config(
        SessionConfig::new().with_repartition_file_scans(false),
    );

    let mut conformed = Vec::new();
    for (idx, path) in paths.iter().enumerate() {
        let table = format!("source_{idx}");
        let location = path.to_str().ok_or_else(|| {
            WqError::data_source("CSV", format!("non UTF-8 path: {}", path.display()))
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let schema = text_schema(path)?;
        let available: HashSet<String> =
            schema.fields().iter().map(|f| f.name().clone()).collect();

        ctx.register_csv(
            table.as_str(),
            location,
            CsvReadOptions::new()
                .has_header(true)
                .file_extension(&extension)
                .schema(&schema),
        )
        .await
        .map_err(|e| WqError::data_source("CSV", format!("{}: {e}", path.display())))?;

        let sql = format!(
            "SELECT {} FROM {}",
            projection(&available, mapping, path)?,
            SqlSecurity::escape_identifier(&table)?
        );
        let batches = ctx
            .sql(&sql)
            .await?
            .collect()
            .await
            .map_err(|e| WqError::data_source("CSV", format!("{}: {e}", path.display())))?;

        let mut rows = 0;
        for batch in &batches {
            rows += batch.num_rows();
            conformed.push(conform_batch(batch)?);
        }
        info!(path = %path.display(), rows, "loaded source file");
    }

    Ok(concat_batches(&observation_schema(), &conformed)?)
}

/// Writes `batch` as CSV with a header row, creating parent directories.
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(file);
    writer.write(batch)?;
    Ok(())
}
