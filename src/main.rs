// repo-gallery - offline-first photo gallery for images hosted in a repository
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use clap::Parser;
use repo_gallery::cli::Args;
use repo_gallery::config::AppConfig;
use repo_gallery::gallery::GalleryState;
use repo_gallery::listing::ListingClient;
use repo_gallery::server::create_router;
use repo_gallery::utils::logging;
use repo_gallery::worker::ServiceWorker;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = AppConfig::load(args.config.as_deref())?;

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting repo-gallery v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(run(args, config))
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    let listing = ListingClient::new(&config.repo, &config.fetch)?;
    let worker = ServiceWorker::from_config(&config).await?;

    // Phase 3: One-shot actions
    if args.is_one_shot() {
        return run_action(&args, &listing, &worker).await;
    }

    // Phase 4: Install and activate the worker
    let report = worker.start().await?;
    info!(
        "Worker active, removed {} expired and {} least-recently-used images",
        report.expired, report.lru
    );
    let maintenance = worker.spawn_maintenance(config.cache.cleanup_interval());

    // Phase 5: Build and start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(config, worker, listing);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.abort();
    info!("Server shut down gracefully");
    Ok(())
}

async fn run_action(args: &Args, listing: &ListingClient, worker: &ServiceWorker) -> Result<()> {
    if args.clear_images {
        let removed = worker.clear_images().await?;
        println!("Removed {} cached images", removed);
    }

    if args.list {
        for item in listing.fetch_images().await? {
            println!("{}", item.url);
        }
    }

    if let Some(count) = args.prefetch {
        let urls: Vec<String> = listing.fetch_images().await?.into_iter().map(|item| item.url).collect();
        let gallery = GalleryState::new(urls)?;
        let window = gallery.window(args.start, count as usize)?;

        let mut stored = 0;
        for url in &window {
            match worker.cache_image(url).await {
                Ok(true) => stored += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to cache {}: {}", url, e),
            }
        }
        println!("Cached {}/{} images", stored, window.len());
    }

    if args.cache_size {
        let size = worker.image_cache_size().await?;
        println!(
            "Image cache: {} images, {} MB ({} GB)",
            size.entries,
            size.megabytes(),
            size.gigabytes()
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
