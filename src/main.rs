use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use road_seg_rs::config::Command;
use road_seg_rs::{
    server, Config, Dashboard, DefaultPair, HttpFetcher, OnnxModel, RoadSegmentationModel,
    SegmentationPipeline, Storage,
};

fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.debug);

    ensure!(
        config.model_path.exists(),
        "Model path does not exist: {}",
        config.model_path.display()
    );

    let model = OnnxModel::new(
        &config.model_path,
        config.device_id,
        config.layout,
        config.model_input_size,
    )
    .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?;
    let model: Arc<dyn RoadSegmentationModel> = Arc::new(model);
    let storage = Storage::new(&config.storage_dir);
    let pipeline = SegmentationPipeline::new(model, storage.clone(), config.interpolation);

    match config.command {
        Command::Serve {
            bind,
            port,
            before_id,
            after_id,
            download_url,
        } => {
            let dashboard = Dashboard::new(
                pipeline,
                Arc::new(HttpFetcher::new(download_url)),
                DefaultPair::new(before_id, after_id),
            );
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(server::serve(dashboard, SocketAddr::new(bind, port)));
        }
        Command::Predict { input, output } => {
            ensure!(input.is_file(), "Input raster does not exist: {}", input.display());
            let output = match output {
                Some(path) => path,
                None => {
                    let name = input
                        .file_name()
                        .and_then(|n| n.to_str())
                        .context("Input path has no file name")?;
                    storage.ensure_dirs()?;
                    storage.output_path(name)?
                }
            };
            let info = pipeline
                .process(&input, &output)
                .with_context(|| format!("Failed to segment {}", input.display()))?;
            tracing::info!(
                output = %output.display(),
                width = info.width,
                height = info.height,
                "mask written"
            );
        }
        Command::Batch { input_dir } => {
            let summary = pipeline.process_directory(&input_dir)?;
            for (path, reason) in &summary.failed {
                tracing::warn!(file = %path.display(), %reason, "skipped");
            }
            ensure!(
                summary.failed.is_empty(),
                "{} of {} rasters failed",
                summary.failed.len(),
                summary.failed.len() + summary.processed.len()
            );
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
