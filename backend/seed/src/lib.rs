//! # Catalog Seeding
//!
//! Loads nominations and candidates from a JSON file into Redis. This is the only way
//! the catalog changes, the public API never writes it.
//!
//! ## File
//! ```json
//! {
//!   "nominations": [
//!     {
//!       "id": 1,
//!       "title": "Best Film",
//!       "emoji": "🎬",
//!       "description": "Feature films",
//!       "candidates": [{ "id": 10, "name": "First" }]
//!     }
//!   ]
//! }
//! ```
//!
//! ## Rules
//! - Nomination ids and candidate ids are unique across the file, ids start at 1
//! - Titles and candidate names are not blank
//! - Re-seeding updates titles and names but never resets a tally
//! - A candidate already stored under one nomination cannot move to another
//!
//! The same file can back a Redis-less server, see `CATALOG_PATH`.
use std::path::Path;

use anyhow::Context;
use server::{database::RedisStore, models::CatalogSeed};

pub async fn load_catalog(path: &Path, redis_url: &str, dry_run: bool) -> anyhow::Result<()> {
    let catalog = CatalogSeed::read(path)?;

    println!("Loaded Nominations: {}", catalog.nominations.len());
    println!("Loaded Candidates: {}\n", catalog.candidate_count());

    if dry_run {
        println!("Dry run, nothing written.");
        return Ok(());
    }

    let store = RedisStore::connect(redis_url)
        .await
        .with_context(|| format!("connecting to {redis_url}"))?;
    let report = store.seed(&catalog).await?;

    println!("Written Nominations: {}", report.nominations);
    println!("Written Candidates: {}", report.candidates);

    Ok(())
}
