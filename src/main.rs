use std::sync::Arc;

use clap::Parser;
use sea_orm_migration::MigratorTrait;
use tracing::error;
use wallgen::activation::ImageActivation;
use wallgen::clients::Collaborators;
use wallgen::config::setup_logging;
use wallgen::db::entities::wallpapers::SeaOrmCatalog;
use wallgen::pipeline::WallpaperGenerationPipeline;
use wallgen::web::AppState;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = wallgen::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        anyhow::bail!("Failed to set up logging");
    }

    let db = wallgen::db::connect_db(&cli.providers.database_path)
        .await
        .inspect_err(|err| error!("Database connection error: {}", err))?;

    wallgen::db::migrations::Migrator::up(&db, None)
        .await
        .inspect_err(|err| error!("Database migration error: {}", err))?;

    let collaborators = Collaborators::from_options(&cli.providers)
        .inspect_err(|err| error!("Failed to build provider clients: {}", err))?;
    let config = cli.pipeline_config();

    let pipeline = Arc::new(WallpaperGenerationPipeline::new(
        config.clone(),
        collaborators.clone(),
        Arc::new(SeaOrmCatalog::new(db.clone())),
    ));
    let activation = Arc::new(ImageActivation::new(config, &collaborators, db));

    // kept alive for the lifetime of the server
    let _scheduler = wallgen::scheduler::start_scheduler(pipeline.clone())
        .await
        .inspect_err(|err| error!("Failed to start scheduler: {}", err))?;

    wallgen::web::setup_server(
        &cli.listen_address,
        cli.port,
        AppState::new(pipeline, activation, cli.admin_token),
    )
    .await
    .inspect_err(|err| error!("Application error: {}", err))
}
