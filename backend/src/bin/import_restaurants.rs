//! Load a JSON array of restaurant records into the record store.
//!
//! Each element is validated on its own; invalid elements are reported on
//! stderr and skipped. Valid records are written with one atomic batch per
//! chunk, so a failed chunk leaves earlier chunks in place and can be retried
//! by re-running the import (writes are idempotent upserts keyed by place id).
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::env;
use std::io::Read;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Dir};
use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use mockable::DefaultClock;
use serde_json::Value;
use tokio::runtime::Builder;

use platelist::domain::ports::RecordStore;
use platelist::domain::record::{Collection, Document, FieldPath, FieldUpdate, WriteOp};
use platelist::domain::{Restaurant, RestaurantDraft};
use platelist::outbound::persistence::{DbPool, DieselRecordStore, PoolConfig};

/// Upper bound on operations per batch; each record takes two.
const MAX_CHUNK_SIZE: usize = 250;

/// `import-restaurants` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "import-restaurants",
    about = "Validate and load scraped restaurant records into the store",
    version
)]
struct CliArgs {
    /// Path to a JSON file holding an array of restaurant objects.
    #[arg(long = "file", value_name = "path")]
    file: Utf8PathBuf,
    /// Database connection URL. Falls back to `PLATELIST_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
    /// Records written per atomic batch.
    #[arg(long = "chunk-size", value_name = "n", default_value_t = 200)]
    chunk_size: usize,
    /// Validate only; nothing is written.
    #[arg(long = "dry-run")]
    dry_run: bool,
}

/// A record that failed validation, identified by its array position.
#[derive(Debug, PartialEq)]
struct Rejected {
    index: usize,
    place_id: Option<String>,
    reason: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = CliArgs::try_parse()?;
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build import runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: CliArgs) -> Result<()> {
    let raw = read_input(&args.file)?;
    let (restaurants, rejected) = partition_records(&raw)?;
    for rejection in &rejected {
        eprintln!(
            "skipped record {} ({}): {}",
            rejection.index,
            rejection.place_id.as_deref().unwrap_or("no placeId"),
            rejection.reason
        );
    }
    println!("valid={} rejected={}", restaurants.len(), rejected.len());
    if args.dry_run {
        return Ok(());
    }

    let database_url = resolve_database_url(args.database_url)?;
    let pool = DbPool::new(PoolConfig::new(&database_url))
        .await
        .wrap_err("failed to create database pool")?;
    let store = DieselRecordStore::new(pool, Arc::new(DefaultClock));

    let chunk_size = args.chunk_size.clamp(1, MAX_CHUNK_SIZE);
    let mut written = 0_usize;
    for chunk in restaurants.chunks(chunk_size) {
        let ops = chunk_ops(chunk)?;
        store
            .batch(ops)
            .await
            .map_err(|err| eyre!("batch write failed after {written} records: {err}"))?;
        written += chunk.len();
        println!("written={written}");
    }
    Ok(())
}

fn read_input(path: &Utf8Path) -> Result<String> {
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("input path {path} must name a file"))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("failed to open input directory {parent}"))?;
    let mut file = directory
        .open(file_name)
        .wrap_err_with(|| format!("failed to open input file {path}"))?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)
        .wrap_err_with(|| format!("failed to read input file {path}"))?;
    Ok(raw)
}

/// Split the input array into valid restaurants and rejections.
///
/// Later duplicates of a place id replace earlier ones.
fn partition_records(raw: &str) -> Result<(Vec<Restaurant>, Vec<Rejected>)> {
    let items: Vec<Value> =
        serde_json::from_str(raw).wrap_err("input must be a JSON array of objects")?;
    let mut valid: Vec<Restaurant> = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let place_id = item
            .get("placeId")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let parsed = serde_json::from_value::<RestaurantDraft>(item)
            .map_err(|err| err.to_string())
            .and_then(|draft| Restaurant::try_from(draft).map_err(|err| err.to_string()));
        match parsed {
            Ok(restaurant) => {
                valid.retain(|existing| existing.place_id() != restaurant.place_id());
                valid.push(restaurant);
            }
            Err(reason) => rejected.push(Rejected {
                index,
                place_id,
                reason,
            }),
        }
    }
    Ok((valid, rejected))
}

/// Upsert each restaurant and stamp its update time.
fn chunk_ops(chunk: &[Restaurant]) -> Result<Vec<WriteOp>> {
    let mut ops = Vec::with_capacity(chunk.len() * 2);
    for restaurant in chunk {
        let id = restaurant.place_id().as_str().to_owned();
        let document = Document::encode(id.clone(), restaurant)
            .map_err(|err| eyre!("failed to encode {id}: {err}"))?;
        ops.push(WriteOp::Set(Collection::Restaurants, document));
        ops.push(WriteOp::Update {
            collection: Collection::Restaurants,
            id,
            updates: vec![FieldUpdate::ServerTimestamp(FieldPath::new("updatedAt"))],
            precondition: None,
        });
    }
    Ok(ops)
}

fn resolve_database_url(explicit: Option<String>) -> Result<String> {
    let url = match explicit {
        Some(value) => value,
        None => env::var("PLATELIST_DATABASE_URL")
            .wrap_err("pass --database-url or set PLATELIST_DATABASE_URL")?,
    };
    if url.trim().is_empty() {
        return Err(eyre!("database URL must not be empty"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn record(place_id: &str, rating: f64) -> Value {
        json!({
            "placeId": place_id,
            "name": format!("Place {place_id}"),
            "rating": rating,
            "userRatingsTotal": 10,
            "address": "1 Main St",
            "location": { "latitude": 40.0, "longitude": -73.0 },
            "types": ["restaurant"]
        })
    }

    #[rstest]
    fn invalid_records_are_reported_and_skipped() {
        let raw = json!([
            record("p1", 4.5),
            record("p2", 9.0),
            { "name": "no id" },
            record("p3", 3.0)
        ])
        .to_string();

        let (valid, rejected) = partition_records(&raw).expect("array parses");

        let ids: Vec<_> = valid.iter().map(|r| r.place_id().as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        let indices: Vec<_> = rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(rejected[0].place_id.as_deref(), Some("p2"));
        assert!(rejected[1].place_id.is_none());
    }

    #[rstest]
    fn later_duplicates_win() {
        let raw = json!([record("p1", 1.0), record("p1", 4.0)]).to_string();

        let (valid, rejected) = partition_records(&raw).expect("array parses");

        assert!(rejected.is_empty());
        assert_eq!(valid.len(), 1);
        assert!((valid[0].rating() - 4.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn non_array_input_is_an_error() {
        assert!(partition_records(r#"{"placeId":"p1"}"#).is_err());
    }

    #[rstest]
    fn each_record_becomes_set_then_timestamp() {
        let raw = json!([record("p1", 4.0), record("p2", 3.0)]).to_string();
        let (valid, _) = partition_records(&raw).expect("array parses");

        let ops = chunk_ops(&valid).expect("encodes");

        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], WriteOp::Set(Collection::Restaurants, doc) if doc.id() == "p1"));
        assert!(matches!(&ops[1], WriteOp::Update { id, .. } if id == "p1"));
        assert!(matches!(&ops[2], WriteOp::Set(Collection::Restaurants, doc) if doc.id() == "p2"));
    }

    #[rstest]
    #[case(Some("  ".to_owned()))]
    fn blank_database_url_is_rejected(#[case] explicit: Option<String>) {
        assert!(resolve_database_url(explicit).is_err());
    }
}
