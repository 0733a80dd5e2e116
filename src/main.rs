use std::path::Path;

use clap::Parser;
use color_eyre::eyre::Result;
use futures_util::future::join_all;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imagepipe::infrastructure::{CliArgs, ImageLoaderConfig};
use imagepipe::{Data, ImageLoader, ImageLoaderBuilder, ImageRequest, ImageResult};

fn init_logging(config: &ImageLoaderConfig, log_path: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn create_loader() -> Result<(ImageLoader, Vec<String>)> {
    let args = CliArgs::parse();
    let mut config = ImageLoaderConfig::load(args.config.as_deref())?;
    config.merge_with_args(&args);

    init_logging(&config, args.log_file.as_deref())?;

    info!(version = imagepipe::VERSION, "Starting imagepipe");

    let loader = ImageLoaderBuilder::from_config(&config).build();
    Ok((loader, args.data))
}

fn describe(input: &str, result: &ImageResult) -> String {
    match result {
        ImageResult::Success(success) => format!(
            "ok     {input}  {}x{}  from {}",
            success.image.width(),
            success.image.height(),
            success.data_source
        ),
        ImageResult::Error(failure) => format!("failed {input}  {}", failure.error),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (loader, inputs) = create_loader()?;

    let requests = inputs
        .iter()
        .map(|input| loader.execute(ImageRequest::new(Data::parse(input))));
    let results = join_all(requests).await;

    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(result) => println!("{}", describe(input, &result)),
            Err(cancelled) => println!("failed {input}  {cancelled}"),
        }
    }

    if let Some(cache) = loader.memory_cache() {
        info!(stats = %cache.stats(), "Memory cache");
    }
    loader.shutdown();

    Ok(())
}
