//! Application lifecycle management and graceful shutdown.
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. HTTP server stops accepting new connections
//! 2. Shutdown signal broadcast to background tasks
//! 3. Each task gets `SHUTDOWN_TIMEOUT` seconds to finish its current pass
//! 4. Clean exit

use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Running application with its background tasks.
pub struct Application {
    /// TCP listener for HTTP server
    listener: tokio::net::TcpListener,

    /// Axum router with all HTTP routes
    app: axum::Router,

    /// Background tasks (sweeper)
    tasks: Vec<(&'static str, JoinHandle<()>)>,

    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,

    /// Application configuration
    config: Arc<Config>,
}

impl Application {
    /// Create a new application instance.
    #[must_use]
    pub fn new(
        listener: tokio::net::TcpListener,
        app: axum::Router,
        tasks: Vec<(&'static str, JoinHandle<()>)>,
        shutdown_tx: broadcast::Sender<()>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            listener,
            app,
            tasks,
            shutdown_tx,
            config,
        }
    }

    /// Address the HTTP server is bound to.
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the application until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the application until `signal` completes.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run_until<F>(self, signal: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(
            address = %self.config.bind_address(),
            backend = ?self.config.storage,
            "HTTP server listening for requests"
        );

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await?;

        info!("HTTP server stopped, initiating graceful shutdown...");

        // Receivers may already be gone if a task exited early.
        let _ = self.shutdown_tx.send(());

        let timeout = Duration::from_secs(self.config.server.shutdown_timeout);
        Self::await_shutdown(self.tasks, timeout).await;

        info!("Graceful shutdown complete");
        Ok(())
    }

    /// Gives each background task `timeout` to finish.
    async fn await_shutdown(tasks: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
        for (name, handle) in tasks {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!(task = name, "Task stopped gracefully"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task failed"),
                Err(_) => warn!(task = name, "Task shutdown timed out"),
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed, that signal source is ignored and the
/// other one still works.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
