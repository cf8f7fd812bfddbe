mod config;
mod error;
mod files;
mod server;

use anyhow::Context;
use archive_search_core::{
    collect_documents, load_in_batches, reindex, BulkApiTarget, DocumentStore,
    ElasticsearchStore, IngestionOptions, LopdfExtractor, ReindexReport, SearchCoordinator,
    StoreConnection, DEFAULT_REINDEX_BATCH,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{MatchArgs, ServeArgs, StoreArgs};
use server::{cors_layer, create_app, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "archive-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP search API.
    Serve(ServeArgs),
    /// Extract every PDF under a folder and bulk-load it into the index.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long, env = "PDF_DIR")]
        pdf_dir: PathBuf,
        /// Documents per bulk request.
        #[arg(long, default_value_t = 1_000)]
        batch_size: usize,
        /// Parallel extraction workers; defaults to the CPU count minus two.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run one paginated search and print the page as JSON.
    Search {
        query: String,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        page: i64,
        #[command(flatten)]
        matching: MatchArgs,
    },
    /// Print the cluster health.
    Health,
    /// Copy documents into another deployment through its bulk API. Copies the
    /// configured index unless source indices are named or `--all-indices` is set.
    Reindex {
        /// Source indices to copy, in order; repeat or separate with commas.
        #[arg(long = "source-index", value_delimiter = ',', conflicts_with = "all_indices")]
        source_indices: Vec<String>,
        /// Copy every index of the source cluster, hidden ones excluded.
        #[arg(long)]
        all_indices: bool,
        /// Base URL of the receiving search API.
        #[arg(long, env = "ES_TARGET", default_value = "http://localhost:8000")]
        target_url: String,
        /// Documents per scroll page and bulk request.
        #[arg(long, default_value_t = DEFAULT_REINDEX_BATCH)]
        batch_size: usize,
        /// Bearer token for the receiving bulk endpoint.
        #[arg(long, env = "TARGET_API_TOKEN", hide_env_values = true)]
        api_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = cli
        .store
        .build_store()
        .context("invalid document store configuration")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        endpoint = store.endpoint(),
        index = store.index_name(),
        "archive-search boot"
    );

    match cli.command {
        Command::Serve(args) => run_server(store, &cli.store, args).await,
        Command::Ingest {
            pdf_dir,
            batch_size,
            workers,
        } => {
            let mut options = IngestionOptions {
                batch_size,
                ..IngestionOptions::default()
            };
            if let Some(workers) = workers {
                options.workers = workers.max(1);
            }
            run_ingest(store, &cli.store, &pdf_dir, options).await
        }
        Command::Search {
            query,
            page,
            matching,
        } => {
            let connection = Arc::new(StoreConnection::new(store));
            let coordinator = SearchCoordinator::with_settings(
                connection,
                matching.settings(),
                matching.page_size,
            );
            let result = coordinator.paginate_search(&query, page).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Health => {
            let status = store.health().await.context("health check failed")?;
            println!("cluster_status={}", status.as_str());
            Ok(())
        }
        Command::Reindex {
            source_indices,
            all_indices,
            target_url,
            batch_size,
            api_token,
        } => {
            let indices = if all_indices {
                store
                    .list_indices()
                    .await
                    .context("failed to list source indices")?
            } else if source_indices.is_empty() {
                vec![store.index_name().to_string()]
            } else {
                source_indices
            };
            info!(?indices, target = %target_url, "reindexing");

            let target = BulkApiTarget::new(&target_url, api_token);
            let mut report = ReindexReport::default();
            for index in &indices {
                let source = store.for_index(index.as_str());
                let copied = reindex(&source, &target, batch_size)
                    .await
                    .with_context(|| format!("reindex of {index} aborted"))?;
                info!(%index, read = copied.read, indexed = copied.outcome.indexed, "index copied");
                report.absorb(copied);
            }

            println!(
                "{} indices, {} documents read in {} batches: {} indexed, {} failed, {} batches rejected",
                indices.len(),
                report.read,
                report.batches,
                report.outcome.indexed,
                report.outcome.failed,
                report.failed_batches
            );
            Ok(())
        }
    }
}

async fn run_server(
    store: ElasticsearchStore,
    store_args: &StoreArgs,
    args: ServeArgs,
) -> anyhow::Result<()> {
    let connection = Arc::new(StoreConnection::new(store));
    if let Err(error) = connection.connect(&store_args.retry_policy()).await {
        warn!(%error, "starting without a document store; requests will retry the connection");
    }

    let coordinator = SearchCoordinator::with_settings(
        Arc::clone(&connection),
        args.matching.settings(),
        args.matching.page_size,
    );
    let state = AppState {
        coordinator: Arc::new(coordinator),
        pdf_root: args.pdf_root.map(Arc::new),
        api_token: args.api_token.as_deref().map(Arc::from),
    };
    if state.api_token.is_none() {
        warn!("API_TOKEN is not set; the bulk endpoint accepts unauthenticated writes");
    }

    let app = create_app(state, cors_layer(&args.cors_origins));
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(address = %args.listen, "search api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    connection.close();
    Ok(())
}

async fn run_ingest(
    store: ElasticsearchStore,
    store_args: &StoreArgs,
    pdf_dir: &std::path::Path,
    options: IngestionOptions,
) -> anyhow::Result<()> {
    let connection = StoreConnection::new(store);
    connection.connect(&store_args.retry_policy()).await?;

    let store = connection.store();
    store
        .ensure_index()
        .await
        .context("failed to create the index")?;

    let report = collect_documents(pdf_dir, &options, Arc::new(LopdfExtractor)).await?;
    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }

    let summary = load_in_batches(store, &report.documents, options.batch_size).await;
    connection.close();

    println!(
        "{} of {} files extracted, {} indexed, {} failed ({} of {} batches rejected) at {}",
        report.documents.len(),
        report.files_found,
        summary.outcome.indexed,
        summary.outcome.failed,
        summary.failed_batches,
        summary.batches,
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
