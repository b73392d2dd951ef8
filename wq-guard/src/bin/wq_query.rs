//! Runs one request against the cleaned dataset and prints the JSON body.
//!
//! e.g. `wq-query /api/outliers field=temperature method=iqr`

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use wq_guard::api::WaterQualityApi;
use wq_guard::config::ServiceConfig;
use wq_guard::filter::QueryParams;
use wq_guard::ingest::{load_csv_files, ColumnMapping};
use wq_guard::logging::setup::init_logging;
use wq_guard::store::{DataFusionStore, ObservationStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Endpoint path, e.g. /api/stats
    path: String,

    /// Query parameters as key=value
    #[arg(value_parser = parse_param)]
    params: Vec<String>,
}

fn parse_param(raw: &str) -> Result<String, String> {
    match raw.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(raw.to_string()),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    let params = QueryParams::from_pairs(&args.params)?;

    let config = ServiceConfig::from_env()?;
    init_logging(config.logging.clone())?;

    // fail fast: the dataset must load before any request is served
    let cleaned = load_csv_files(
        &[config.ingest.output_path.clone()],
        &ColumnMapping::canonical(),
    )
    .await?;
    let store = Arc::new(DataFusionStore::new(config.store.clone())?);
    store.replace_all(vec![cleaned]).await?;

    let api = WaterQualityApi::new(store);
    let response = api.handle(&args.path, &params).await;
    println!("{}", serde_json::to_string_pretty(&response.body)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_collect_key_value_params() {
        let args = Args::try_parse_from([
            "wq-query",
            "/api/outliers",
            "field=temperature",
            "method=iqr",
        ])
        .unwrap();
        assert_eq!(args.path, "/api/outliers");

        let params = QueryParams::from_pairs(&args.params).unwrap();
        assert_eq!(params.get("field"), Some("temperature"));
        assert_eq!(params.get("method"), Some("iqr"));
    }

    #[test]
    fn test_args_reject_malformed_params() {
        assert!(Args::try_parse_from(["wq-query", "/api/stats", "fields"]).is_err());
        assert!(Args::try_parse_from(["wq-query", "/api/stats", "=odo"]).is_err());
        assert!(Args::try_parse_from(["wq-query"]).is_err());
    }

    #[test]
    fn test_help_is_not_a_request_path() {
        let err = Args::try_parse_from(["wq-query", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
