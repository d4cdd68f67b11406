#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::classifier::{ContentClassifier, ProfanityFilter};
use crate::adapters::database::{self, PgMessageStore};
use crate::adapters::store::{MemoryMessageStore, MessageStore};
use crate::api::ServiceContainer;
use crate::config::{Config, SeedConfig, StoreBackend};
use crate::domain::message::GeoPoint;
use crate::services::feed_service::FeedService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::workers::RetentionWorker;
use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Background loops owned by the server process.
#[derive(Debug)]
pub struct Workers {
    pub retention: RetentionWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.retention.run(shutdown_rx).instrument(tracing::info_span!("retention_worker")))]
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Wires services and workers around one store.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn MessageStore>>,
    classifier: Option<Arc<dyn ContentClassifier>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None, classifier: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Assembles the application.
    ///
    /// # Errors
    /// Returns an error if no store was provided.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("a message store is required"))?;
        let classifier = self.classifier.unwrap_or_else(|| Arc::new(ProfanityFilter::default()));

        let message_service = MessageService::new(Arc::clone(&store), classifier);
        let feed_service = FeedService::new(Arc::clone(&store), self.config.feed.sampling_policy());
        let health_service =
            HealthService::new(Arc::clone(&store), Duration::from_millis(self.config.store.ping_timeout_ms));
        let retention = RetentionWorker::new(store, &self.config.retention);

        Ok(App {
            services: ServiceContainer { message_service, feed_service },
            health_service,
            workers: Workers { retention },
        })
    }
}

/// Opens the configured store. For Postgres the connection is retried with
/// backoff and the schema is migrated before returning.
///
/// # Errors
/// Returns an error if the Postgres URL is missing, every connection attempt
/// fails, or a migration fails.
pub async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn MessageStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; messages will not survive a restart");
            Ok(Arc::new(MemoryMessageStore::new()))
        }
        StoreBackend::Postgres => {
            let Some(url) = config.store.database_url.as_deref() else {
                anyhow::bail!("the postgres store requires --database-url (or GEOFEED_DATABASE_URL)");
            };

            let retry_strategy = ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(250))
                .with_max_delay(Duration::from_secs(5))
                .with_max_times(config.store.connect_attempts.saturating_sub(1));

            let pool = (|| database::init_pool(url, &config.store))
                .retry(&retry_strategy)
                .notify(|e, duration| {
                    tracing::warn!(error = %e, retry_in = ?duration, "Database connection failed, retrying...");
                })
                .await
                .map_err(|e| anyhow::anyhow!("could not connect to the message database: {e}"))?;

            database::run_migrations(&pool).await?;
            tracing::info!("Database connected and migrated");
            Ok(Arc::new(PgMessageStore::new(pool)))
        }
    }
}

/// One message per non-empty line, surrounding whitespace trimmed.
#[must_use]
pub fn seed_lines(content: &str) -> Vec<String> {
    content.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}

/// Loads the configured seed file into the store. Does nothing when no file
/// is configured.
///
/// # Errors
/// Returns an error if the file cannot be read or the store rejects the batch.
pub async fn seed_store(messages: &MessageService, seed: &SeedConfig) -> anyhow::Result<usize> {
    let Some(path) = seed.file.as_deref() else {
        return Ok(0);
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("could not read seed file {}", path.display()))?;
    let inserted =
        messages.seed(seed_lines(&content), GeoPoint::new(seed.center_lng, seed.center_lat), seed.spread_deg).await?;
    Ok(inserted)
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining...");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the configured log sink.
pub fn setup_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        tracing::error!(panic = %info, location = %location, "Process panicked");
        default_hook(info);
    }));
}
