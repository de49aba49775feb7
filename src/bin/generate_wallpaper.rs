use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sea_orm_migration::MigratorTrait;
use wallgen::cli::ProviderOptions;
use wallgen::clients::Collaborators;
use wallgen::config::setup_logging;
use wallgen::db::entities::wallpapers::SeaOrmCatalog;
use wallgen::pipeline::WallpaperGenerationPipeline;

/// Generate a single wallpaper and record it in the catalog.
///
/// Runs every pipeline stage once, ignoring the scheduler flags, and prints
/// the new catalog row as JSON.
#[derive(Parser, Debug)]
#[command(name = "generate_wallpaper")]
struct Args {
    /// Enable debug logging
    #[arg(long, env = "WALLGEN_DEBUG")]
    debug: bool,

    #[command(flatten)]
    providers: ProviderOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).map_err(|err| anyhow::anyhow!("logging setup failed: {err}"))?;

    let db = wallgen::db::connect_db(&args.providers.database_path)
        .await
        .with_context(|| format!("opening {}", args.providers.database_path))?;
    wallgen::db::migrations::Migrator::up(&db, None)
        .await
        .context("running migrations")?;

    let collaborators =
        Collaborators::from_options(&args.providers).context("building provider clients")?;
    let pipeline = WallpaperGenerationPipeline::new(
        args.providers.pipeline_config(),
        collaborators,
        Arc::new(SeaOrmCatalog::new(db)),
    );

    let wallpaper = pipeline.run().await.context("wallpaper generation failed")?;
    println!("{}", serde_json::to_string_pretty(&wallpaper)?);
    Ok(())
}
