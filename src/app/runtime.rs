//! Runtime wiring
//!
//! Builds the pipeline from a [`PipeConfig`] and runs it either as the full
//! HTTP service or as a plain tailer printing records to stdout.

use crate::api::{self, ApiState, SessionStore};
use crate::app::config::AppConfig;
use crate::config::{load_config, PipeConfig};
use crate::events::{EventBus, PipeEvent};
use crate::journal::EventJournal;
use crate::process::{CancellationController, ProcessRegistry, RegistryConfig, WorkerProgram};
use crate::subscribers::{Dispatcher, HttpTransport};
use crate::watcher::{expand_tilde, LogTailer};
use anyhow::{Context, Result};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Core components sharing one event bus, with the background consumers running.
pub struct Pipeline {
    pub bus: EventBus,
    pub registry: Arc<ProcessRegistry>,
    pub canceller: Arc<CancellationController>,
    consumers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Create the registry and canceller and start the dispatcher and journal.
    pub async fn start(config: &PipeConfig) -> Result<Self> {
        let bus = EventBus::new(config.bus_capacity);
        let registry = ProcessRegistry::new(
            RegistryConfig {
                program: WorkerProgram::new(&config.send.program),
                identify_timeout: config.send.identify_timeout(),
            },
            bus.clone(),
        );
        let canceller = Arc::new(CancellationController::new(
            Arc::clone(&registry),
            config.send.cancel_grace(),
        ));

        let transport =
            HttpTransport::new(DELIVERY_TIMEOUT).context("Failed to build HTTP client")?;
        let dispatcher = Dispatcher::new(
            config.subscribers.clone(),
            Arc::new(transport),
            &config.dispatch,
        )
        .with_registry(Arc::clone(&registry));

        let mut consumers = vec![dispatcher.spawn(bus.subscribe())];
        match EventJournal::open(&config.log_dir).await {
            Ok(journal) => consumers.push(journal.spawn(bus.subscribe())),
            Err(e) => warn!(
                "Audit journal disabled, cannot open {}: {}",
                config.log_dir.display(),
                e
            ),
        }

        Ok(Self {
            bus,
            registry,
            canceller,
            consumers,
        })
    }

    pub fn api_state(&self, config: &PipeConfig) -> Arc<ApiState> {
        Arc::new(ApiState {
            sessions: SessionStore::new(&config.watch_dir),
            registry: Arc::clone(&self.registry),
            canceller: Arc::clone(&self.canceller),
            bus: self.bus.clone(),
            send: config.send.clone(),
        })
    }

    /// Stop the background consumers. Running workers are left alone.
    pub fn shutdown(self) {
        for consumer in self.consumers {
            consumer.abort();
        }
    }
}

/// Run the HTTP service until Ctrl-C or SIGTERM.
pub async fn run_server(app: &AppConfig, port: Option<u16>) -> Result<()> {
    let mut config = load_config(&app.config_path)
        .await
        .with_context(|| format!("Failed to load {}", app.config_path.display()))?;
    if let Some(port) = port {
        config.port = port;
    }

    let pipeline = Pipeline::start(&config).await?;
    let router = api::router(pipeline.api_state(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("claude-pipe listening on {}", listener.local_addr()?);

    let tailer = LogTailer::new(&config.watch_dir, pipeline.bus.clone())
        .start()
        .await
        .context("Failed to start log tailer")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tailer.stop().await;
    pipeline.shutdown();
    info!("Server closed");
    Ok(())
}

/// Print every record under the watch root as a JSON line until interrupted.
pub async fn run_tail(app: &AppConfig, dir: Option<PathBuf>) -> Result<()> {
    let root = match dir {
        Some(dir) => expand_tilde(&dir),
        None => {
            load_config(&app.config_path)
                .await
                .with_context(|| format!("Failed to load {}", app.config_path.display()))?
                .watch_dir
        }
    };

    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let tailer = LogTailer::new(&root, bus).start().await?;
    info!("Tailing {}", root.display());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = rx.recv() => match event {
                Ok(PipeEvent::Message(record)) => {
                    let line = serde_json::to_string(&record)?;
                    writeln!(stdout, "{line}")?;
                }
                Ok(PipeEvent::Lifecycle(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} records", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    tailer.stop().await;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down...");
}
