use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON catalog file with nominations and their candidates.
    catalog: PathBuf,

    #[arg(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Validate the catalog without writing it.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    seed::load_catalog(&args.catalog, &args.redis_url, args.dry_run).await
}
