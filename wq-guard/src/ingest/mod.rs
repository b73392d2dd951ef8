//! Batch ingest: discover source CSV files, clean them, persist the cleaned
//! table and load it into the store.

mod csv;

pub use self::csv::{discover_csv_files, load_csv_files, write_csv};

use crate::cleaning::{BatchCleaner, CleaningReport};
use crate::error::Result;
use crate::model::{NumericField, DATE_COLUMN, OBSERVATION_COLUMNS};
use crate::store::ObservationStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// Maps canonical observation columns to source CSV headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl Default for ColumnMapping {
    /// Headers written by the field sensors.
    fn default() -> Self {
        Self {
            entries: [
                ("date", "Date"),
                ("time", "Time"),
                ("latitude", "Latitude"),
                ("longitude", "Longitude"),
                ("temperature", "Temperature (c)"),
                ("salinity", "Salinity (ppt)"),
                ("odo", "ODO mg/L"),
            ]
            .into_iter()
            .map(|(c, s)| (c.to_string(), s.to_string()))
            .collect(),
        }
    }
}

impl ColumnMapping {
    /// Identity mapping, for files that already use canonical headers.
    pub fn canonical() -> Self {
        Self {
            entries: OBSERVATION_COLUMNS
                .iter()
                .map(|c| (c.to_string(), c.to_string()))
                .collect(),
        }
    }

    /// Overrides the source header for `canonical`.
    pub fn with(mut self, canonical: &str, source: impl Into<String>) -> Self {
        let source = source.into();
        match self.entries.iter_mut().find(|(c, _)| c == canonical) {
            Some(entry) => entry.1 = source,
            None => self.entries.push((canonical.to_string(), source)),
        }
        self
    }

    pub fn source_for(&self, canonical: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| c == canonical)
            .map(|(_, s)| s.as_str())
    }

    /// Whether a source file must carry this column.
    pub fn is_required(canonical: &str) -> bool {
        canonical == DATE_COLUMN || NumericField::ALL.iter().any(|f| f.as_str() == canonical)
    }
}

/// Where ingest reads from and writes to.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Glob patterns searched for source files, in order
    pub source_patterns: Vec<String>,
    /// Cleaned table written here as CSV
    pub output_path: PathBuf,
    pub columns: ColumnMapping,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_patterns: vec![
                "data/source_data/*.csv".to_string(),
                "source_data/*.csv".to_string(),
                "data/*.csv".to_string(),
            ],
            output_path: PathBuf::from("data/cleaned.csv"),
            columns: ColumnMapping::default(),
        }
    }
}

impl IngestConfig {
    pub fn with_source_patterns(mut self, patterns: Vec<String>) -> Self {
        self.source_patterns = patterns;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }
}

/// Result of one [`IngestPipeline::run`].
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Source files read, in load order
    pub files: Vec<PathBuf>,
    pub report: CleaningReport,
    /// Rows loaded into the store
    pub stored: u64,
}

/// Discover, load, clean, persist, replace.
pub struct IngestPipeline {
    config: IngestConfig,
    cleaner: BatchCleaner,
    store: Arc<dyn ObservationStore>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, store: Arc<dyn ObservationStore>) -> Self {
        Self {
            config,
            cleaner: BatchCleaner::default(),
            store,
        }
    }

    pub fn with_cleaner(mut self, cleaner: BatchCleaner) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Runs the pipeline. The store is only replaced once the cleaned table
    /// has been written; any earlier failure leaves it untouched.
    #[instrument(skip(self), fields(output = %self.config.output_path.display()))]
    pub async fn run(&self) -> Result<IngestOutcome> {
        let files = discover_csv_files(
            &self.config.source_patterns,
            Some(self.config.output_path.as_path()),
        )?;
        info!(files = files.len(), "discovered source files");

        let raw = load_csv_files(&files, &self.config.columns).await?;
        let cleaned = self.cleaner.clean(&raw)?;

        write_csv(&self.config.output_path, &cleaned.survivors)?;
        let stored = self.store.replace_all(vec![cleaned.survivors]).await?;

        info!(
            total = cleaned.report.total,
            removed = cleaned.report.removed,
            remaining = cleaned.report.remaining,
            stored,
            "ingest complete"
        );
        Ok(IngestOutcome {
            files,
            report: cleaned.report,
            stored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Predicate;
    use crate::store::InMemoryStore;
    use std::fmt::Write as _;
    use std::fs;

    fn source_file(rows: &[(f64, f64, f64)]) -> String {
        let mut out =
            String::from("Date,Time,Latitude,Longitude,Temperature (c),Salinity (ppt),ODO mg/L\n");
        for (t, s, o) in rows {
            writeln!(out, "03/14/21,10:00,25.9,-80.1,{t},{s},{o}").unwrap();
        }
        out
    }

    #[test]
    fn test_mapping_overrides() {
        let mapping = ColumnMapping::default().with("odo", "DO (mg/L)");
        assert_eq!(mapping.source_for("odo"), Some("DO (mg/L)"));
        assert_eq!(mapping.source_for("date"), Some("Date"));
        assert_eq!(ColumnMapping::canonical().source_for("salinity"), Some("salinity"));
        assert!(ColumnMapping::is_required("odo"));
        assert!(!ColumnMapping::is_required("latitude"));
    }

    #[tokio::test]
    async fn test_pipeline_cleans_persists_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("source_data");
        fs::create_dir_all(&sources).unwrap();

        let mut rows: Vec<(f64, f64, f64)> = (0..30)
            .map(|i| {
                let d = (i % 5) as f64 * 0.1;
                (20.0 + d, 35.0 + d, 7.0 + d)
            })
            .collect();
        rows.push((80.0, 35.2, 7.2));
        fs::write(sources.join("a.csv"), source_file(&rows[..15])).unwrap();
        fs::write(sources.join("b.csv"), source_file(&rows[15..])).unwrap();

        let output = dir.path().join("cleaned.csv");
        let config = IngestConfig::default()
            .with_source_patterns(vec![
                format!("{}/*.csv", sources.display()),
                format!("{}/*.csv", dir.path().display()),
            ])
            .with_output_path(&output);
        let store = Arc::new(InMemoryStore::new());
        let pipeline = IngestPipeline::new(config, store.clone());

        let outcome = pipeline.run().await.unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.report.total, 31);
        assert_eq!(outcome.report.removed, 1);
        assert_eq!(outcome.stored, 30);
        assert_eq!(store.count(&Predicate::All).await.unwrap(), 30);
        assert!(output.exists());

        // the cleaned output is never picked up as a source
        let again = pipeline.run().await.unwrap();
        assert_eq!(again.files.len(), 2);
        assert_eq!(again.report.total, 31);
    }

    #[tokio::test]
    async fn test_failed_discovery_leaves_store_untouched() {
        use crate::model::Observation;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::with_observations(vec![Observation::on(
            "03/14/21",
        )]));
        let config = IngestConfig::default()
            .with_source_patterns(vec![format!("{}/nothing/*.csv", dir.path().display())])
            .with_output_path(dir.path().join("cleaned.csv"));

        assert!(IngestPipeline::new(config, store.clone()).run().await.is_err());
        assert_eq!(store.count(&Predicate::All).await.unwrap(), 1);
    }
}
