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
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::group_repo::GroupRepository;
use crate::adapters::database::reaction_repo::ReactionRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::adapters::redis::RedisClient;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::access::AccessPolicy;
use crate::services::broadcast::{Broadcaster, DistributedBroadcaster, InMemoryBroadcaster};
use crate::services::conversation_service::ConversationService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::last_message::LastMessageTracker;
use crate::services::message_service::{MessageRepositories, MessageService};
use crate::services::presence_service::PresenceService;
use crate::services::rate_limit_service::RateLimitService;
use crate::services::reaction_service::ReactionService;
use std::sync::Arc;
use tokio::sync::watch;

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Flips the shutdown channel on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(location = %location, panic = %payload, "Panic occurred");
    }));
}

/// Everything the binary (and the integration tests) need to serve requests.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    pubsub: Option<Arc<RedisClient>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, pubsub: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Fans events out through Redis. Without it events stay in this process.
    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<RedisClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Wires repositories, the broadcaster and services together.
    ///
    /// # Errors
    /// Returns an error if a required resource is missing or the pubsub subscription fails.
    pub async fn build(self) -> anyhow::Result<App> {
        let pool = self.pool.ok_or_else(|| anyhow::anyhow!("Database pool is required"))?;
        let shutdown_rx = self.shutdown_rx.ok_or_else(|| anyhow::anyhow!("Shutdown receiver is required"))?;
        let config = self.config;

        let broadcaster: Arc<dyn Broadcaster> = match self.pubsub {
            Some(pubsub) => {
                tracing::info!("Using distributed broadcaster");
                Arc::new(DistributedBroadcaster::new(pubsub, &config.broadcast, shutdown_rx.clone()).await?)
            }
            None => {
                tracing::info!("Using in-process broadcaster");
                Arc::new(InMemoryBroadcaster::new(&config.broadcast, shutdown_rx.clone()))
            }
        };

        let repos = MessageRepositories::default();
        let conversations = ConversationRepository::new();
        let access = AccessPolicy::new(repos.groups.clone(), repos.messages.clone());
        let tracker = LastMessageTracker::new(conversations.clone(), repos.groups.clone(), repos.messages.clone());

        let presence_service = PresenceService::new(Arc::clone(&broadcaster), shutdown_rx.clone()).await;
        let reaction_service = ReactionService::new(
            pool.clone(),
            ReactionRepository::new(),
            repos.messages.clone(),
            UserRepository::new(),
            access.clone(),
            Arc::clone(&broadcaster),
            &config.messaging,
        );
        let conversation_service = ConversationService::new(
            pool.clone(),
            conversations,
            GroupRepository::new(),
            Arc::clone(&broadcaster),
        );
        let gateway_service = GatewayService::new(
            pool.clone(),
            access.clone(),
            Arc::clone(&broadcaster),
            presence_service,
            config.websocket.clone(),
        );
        let message_service = MessageService::new(
            pool.clone(),
            repos,
            tracker,
            access,
            Arc::clone(&broadcaster),
            config.messaging.clone(),
        );
        let rate_limit_service = RateLimitService::new(config.rate_limit.trusted_proxies.clone());
        let health_service = HealthService::new(pool, broadcaster, config.health.clone());

        Ok(App {
            services: ServiceContainer {
                message_service,
                reaction_service,
                conversation_service,
                gateway_service,
                rate_limit_service,
            },
            health_service,
        })
    }
}
