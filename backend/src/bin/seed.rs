//! Bulk location import from CSV.
//!
//! Reads `name,latitude,longitude` rows (with a header), validates each,
//! and inserts them. Duplicate names are benign skips, so re-running the
//! seed leaves exactly one row per name.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;

use skywatch_server::error::AppError;
use skywatch_server::{init_tracing, store::Store, Config};

#[derive(Parser, Debug)]
#[command(name = "seed", about = "Import locations from a CSV file")]
struct Cli {
    /// Path to the CSV file (name,latitude,longitude with header)
    #[arg(short, long, default_value = "locations_seed.csv")]
    file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SeedRecord {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::load()?);

    let store = Store::connect(&config.database).await?;

    let mut reader = csv::Reader::from_path(&cli.file)?;
    tracing::info!(file = %cli.file.display(), "importing locations");

    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for record in reader.deserialize::<SeedRecord>() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "skipping invalid record");
                skipped += 1;
                continue;
            }
        };

        if let Err(e) = validate(&record) {
            tracing::warn!(name = %record.name, error = e, "skipping record");
            skipped += 1;
            continue;
        }

        match store
            .insert_location(&record.name, record.latitude, record.longitude)
            .await
        {
            Ok(()) => {
                inserted += 1;
                if inserted % 100 == 0 {
                    tracing::info!(inserted, "import progress");
                }
            }
            Err(AppError::DuplicateLocation(name)) => {
                tracing::info!(name = %name, "location already exists");
                skipped += 1;
            }
            Err(e) => {
                tracing::error!(name = %record.name, error = %e, "failed to insert location");
                skipped += 1;
            }
        }
    }

    tracing::info!(inserted, skipped, "import complete");
    Ok(())
}

fn validate(record: &SeedRecord) -> Result<(), &'static str> {
    shared::validate_location_name(&record.name)?;
    shared::validate_latitude(record.latitude)?;
    shared::validate_longitude(record.longitude)?;
    Ok(())
}
