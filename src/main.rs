//! paging-list demo: drives a paging provider over a simulated remote list.
//!
//! Initializes the provider, loads a range of positions through the windowed
//! range loader, and prints every change notification as a JSON line.

use std::sync::Arc;

use clap::Parser;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use paging_list::config::{Cli, Config};
use paging_list::{ItemsProvider, MemorySource, PagingListProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "paging_list=debug"
    } else {
        "paging_list=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("paging-list v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;

    info!(
        page_size = config.provider.page_size,
        range_window = config.provider.range_window,
        total_items = config.source.total_items,
        latency_ms = config.source.latency_ms,
        "Configuration loaded"
    );

    let source = Arc::new(MemorySource::from_config(&config.source));
    let provider = PagingListProvider::<String>::with_config(source.clone(), &config.provider);

    // Print change batches as they are delivered.
    let mut changes = provider.observe_changes();
    let printer = tokio::spawn(async move {
        while let Some(batch) = changes.next().await {
            for change in batch {
                match serde_json::to_string(&change) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "Failed to encode change"),
                }
            }
        }
    });

    // Failed fetches are not retried by the provider; retry the bulk load here.
    let loaded = loop {
        match provider.initialize(cli.load_to).await {
            Ok(loaded) => break loaded,
            Err(e) if !e.is_fatal() => warn!(error = %e, "Initialization failed, retrying"),
            Err(e) => return Err(e.into()),
        }
    };
    info!(loaded, size = provider.size(), state = %provider.state(), "Initialized");

    let last = cli.last.unwrap_or_else(|| provider.size().saturating_sub(1));
    if cli.first <= last {
        let items = provider.load_range(cli.first, last).await?;
        info!(
            first = cli.first,
            last,
            loaded = items.len(),
            first_item = ?items.first(),
            last_item = ?items.last(),
            "Range loaded"
        );
    }

    let stats = provider.stats();
    info!(
        size = provider.size(),
        max_loaded_page = ?provider.max_loaded_page(),
        last_page_loaded = provider.is_last_page_loaded(),
        total_count = ?provider.total_count(),
        pages_fetched = stats.pages_fetched,
        cache_hits = stats.cache_hits,
        fetch_failures = stats.fetch_failures,
        shared_loads = stats.shared_loads,
        requests = source.request_count(),
        "Done"
    );

    // Dropping the provider closes the change stream once pending batches are out.
    drop(provider);
    printer.await?;

    Ok(())
}
