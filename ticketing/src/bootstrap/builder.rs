//! Declarative application builder API.
//!
//! The builder follows a step-by-step initialization pattern:
//! 1. Configure (config, tracing, clock)
//! 2. Initialize stores (in-memory or `PostgreSQL`, migrations applied)
//! 3. Resolve the remote collaborators (user directory, catalog)
//! 4. Build the GraphQL schema and HTTP router, bind the listener
//! 5. Spawn the deadline sweeper and hand back a runnable [`Application`]
//!
//! Each step returns `Result` so a misconfiguration stops startup at the
//! step that caused it.

use super::components::Components;
use super::resources::Resources;
use crate::config::Config;
use crate::gateway::{
    CINEMA_SERVICE, Catalog, MOVIE_SERVICE, RemoteCatalog, RemoteService, RemoteUserDirectory,
    USER_SERVICE, UserDirectory, build_schema,
};
use crate::runtime::Application;
use crate::server::{AppState, build_router};
use cinema_core::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,cinema_ticketing=debug,sqlx=warn";

/// Builder for a fully configured ticketing application.
///
/// Option fields track which steps have run; `build` reports the first
/// missing one.
pub struct ApplicationBuilder {
    /// Application configuration
    config: Option<Arc<Config>>,

    /// Clock shared by every component (system clock unless overridden)
    clock: Arc<dyn Clock>,

    /// Store backends
    resources: Option<Resources>,

    /// Identity provider
    users: Option<Arc<dyn UserDirectory>>,

    /// Movie and cinema catalog
    catalog: Option<Arc<dyn Catalog>>,

    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Create a new application builder.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            config: None,
            clock: Arc::new(SystemClock),
            resources: None,
            users: None,
            catalog: None,
            shutdown_tx,
        }
    }

    /// Set application configuration.
    ///
    /// Call this first; the later steps read it.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Setup tracing and logging.
    ///
    /// `RUST_LOG` overrides the default filter.
    ///
    /// # Errors
    ///
    /// Returns error if a global subscriber is already installed.
    pub fn with_tracing(self) -> Result<Self, Box<dyn std::error::Error>> {
        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        Ok(self)
    }

    /// Replace the system clock (tests drive deadlines with a manual clock).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Initialize the configured store backend.
    ///
    /// # Errors
    ///
    /// Returns error if config is missing, the database is unreachable or a
    /// migration fails.
    pub async fn with_resources(mut self) -> Result<Self, Box<dyn std::error::Error>> {
        let config = self
            .config
            .as_ref()
            .ok_or("Config must be set before initializing resources")?;

        self.resources = Some(Resources::from_config(config).await?);
        Ok(self)
    }

    /// Use already-built stores instead of the configured backend.
    #[must_use]
    pub fn with_stores(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Use this identity provider instead of the remote user service.
    #[must_use]
    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    /// Use this catalog instead of the remote movie and cinema services.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Create HTTP clients for collaborators not overridden.
    ///
    /// # Errors
    ///
    /// Returns error if config is missing or an HTTP client cannot be built.
    pub fn with_collaborators(mut self) -> Result<Self, Box<dyn std::error::Error>> {
        let config = self
            .config
            .as_ref()
            .ok_or("Config must be set before creating collaborators")?;
        let services = &config.services;
        let timeout = services.timeout();

        if self.users.is_none() {
            let service = RemoteService::new(USER_SERVICE, services.user.clone(), timeout)?;
            self.users = Some(Arc::new(RemoteUserDirectory::new(service)));
        }
        if self.catalog.is_none() {
            let movies = RemoteService::new(MOVIE_SERVICE, services.movie.clone(), timeout)?;
            let cinemas = RemoteService::new(CINEMA_SERVICE, services.cinema.clone(), timeout)?;
            self.catalog = Some(Arc::new(RemoteCatalog::new(movies, cinemas)));
        }

        info!(
            user = %services.user,
            movie = %services.movie,
            cinema = %services.cinema,
            timeout_secs = services.timeout_secs,
            "Downstream services configured"
        );
        Ok(self)
    }

    /// Build the application: wire components, bind the listener and spawn
    /// the sweeper.
    ///
    /// # Errors
    ///
    /// Returns error if a previous step was skipped or the bind address is
    /// unavailable.
    pub async fn build(self) -> Result<Application, Box<dyn std::error::Error>> {
        let config = self.config.ok_or("Config must be set before building")?;
        let resources = self
            .resources
            .ok_or("Resources must be initialized before building")?;
        let users = self
            .users
            .ok_or("User directory must be set before building")?;
        let catalog = self.catalog.ok_or("Catalog must be set before building")?;

        let components = Components::new(
            &resources,
            self.clock,
            &config.workflow,
            config.loyalty,
        );

        let gateway = components.gateway(users, catalog);
        let schema = build_schema(gateway);
        let state = AppState::new(schema, resources.probes.clone());
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
        info!(address = %listener.local_addr()?, "Listener bound");

        let sweeper = components.sweeper();
        let sweeper_handle = sweeper.spawn(self.shutdown_tx.subscribe());

        Ok(Application::new(
            listener,
            app,
            vec![("sweeper", sweeper_handle)],
            self.shutdown_tx,
            config,
        ))
    }
}
