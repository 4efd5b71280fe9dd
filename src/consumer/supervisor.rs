//! Consumer supervisor
//!
//! Owns the listener registry and the shared running flag, spawns one
//! [`TopicPollLoop`] task per registration on start, and joins them on stop.

use super::handler::{FnHandler, Handler, HandlerError, MessageContext, TypedHandler};
use super::poll_loop::{LoopState, PollPolicy, TopicPollLoop};
use super::registry::{ListenerRegistry, Registration};
use crate::config::{ClientConfig, ConsumerSection};
use crate::error::{MiniMqError, MiniMqResult};
use crate::listener_span;
use crate::observability::{ConsumerMetrics, MetricsSnapshot};
use crate::transport::{Connector, TcpConnector};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

struct ListenerTask {
    topic: String,
    handle: Option<JoinHandle<()>>,
    state_rx: watch::Receiver<LoopState>,
}

/// Polls every registered topic until stopped
pub struct Consumer<C: Connector = TcpConnector> {
    connector: Arc<C>,
    registry: ListenerRegistry,
    policy: PollPolicy,
    shutdown_timeout: Duration,
    running_tx: Arc<watch::Sender<bool>>,
    tasks: Mutex<Vec<ListenerTask>>,
    metrics: Arc<ConsumerMetrics>,
}

impl Consumer<TcpConnector> {
    /// Consumer talking TCP to the broker named in `config`
    pub fn new(config: &ClientConfig) -> MiniMqResult<Self> {
        config.validate()?;
        let address = config.broker.address()?;
        let connector = TcpConnector::new(address, config.broker.connect_timeout());
        Ok(Self::with_connector(connector, &config.consumer))
    }
}

impl<C: Connector> Consumer<C> {
    pub fn with_connector(connector: C, settings: &ConsumerSection) -> Self {
        let (running_tx, _) = watch::channel(false);
        Self {
            connector: Arc::new(connector),
            registry: ListenerRegistry::new(),
            policy: PollPolicy::from(settings),
            shutdown_timeout: settings.shutdown_timeout(),
            running_tx: Arc::new(running_tx),
            tasks: Mutex::new(Vec::new()),
            metrics: Arc::new(ConsumerMetrics::new()),
        }
    }

    /// Add a listener for `topic`.
    ///
    /// Registering the same topic twice starts two competing loops on it.
    /// Fails with [`MiniMqError::AlreadyStarted`] while the consumer runs.
    pub fn register<H: Handler>(
        &mut self,
        topic: impl Into<String>,
        handler: H,
    ) -> MiniMqResult<Registration> {
        self.register_arc(topic, Arc::new(handler))
    }

    /// Add a listener backed by a shared handler
    pub fn register_arc(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> MiniMqResult<Registration> {
        if self.is_running() {
            return Err(MiniMqError::AlreadyStarted);
        }

        let registration = self.registry.register(topic, handler)?;
        debug!(topic = %registration.topic(), listener = registration.index(), "Listener registered");
        Ok(registration)
    }

    /// Add a listener from an async closure over the raw JSON value
    pub fn register_fn<F, Fut>(
        &mut self,
        topic: impl Into<String>,
        f: F,
    ) -> MiniMqResult<Registration>
    where
        F: Fn(Value, MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(topic, FnHandler::new(f))
    }

    /// Add a listener whose payload is deserialized into `T` first.
    ///
    /// A payload that does not fit `T` counts as a handler failure and is
    /// not acknowledged.
    pub fn register_typed<T, F, Fut>(
        &mut self,
        topic: impl Into<String>,
        f: F,
    ) -> MiniMqResult<Registration>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(topic, TypedHandler::new(f))
    }

    /// Start one poll loop per registration.
    ///
    /// Calling this while already running logs a warning and does nothing.
    /// With `blocking` set, waits for Ctrl-C (or SIGTERM) or for a
    /// [`StopHandle`], then stops the consumer before returning.
    pub async fn start(&self, blocking: bool) {
        {
            let mut tasks = self.tasks.lock().await;

            if self.is_running() {
                warn!("Consumer is already running");
                return;
            }

            // Loops left over from a previous run must be gone before the flag flips back
            self.join_tasks(&mut tasks).await;
            tasks.clear();

            self.running_tx.send_replace(true);
            for (index, listener) in self.registry.iter().enumerate() {
                let (poll_loop, state_rx) = TopicPollLoop::new(
                    Arc::clone(&self.connector),
                    listener.topic.clone(),
                    Arc::clone(&listener.handler),
                    self.policy,
                    self.running_tx.subscribe(),
                    Arc::clone(&self.metrics),
                );
                let span = listener_span!(topic = %listener.topic, listener = index);
                let handle = tokio::spawn(poll_loop.run().instrument(span));

                tasks.push(ListenerTask {
                    topic: listener.topic.clone(),
                    handle: Some(handle),
                    state_rx,
                });
            }

            info!(
                addr = %self.connector.address(),
                "Started {} listener tasks",
                tasks.len()
            );
        }

        if blocking {
            let mut running = self.running_tx.subscribe();
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = running.wait_for(|running| !*running) => {
                    debug!("Stop requested, shutting down listeners");
                }
            }
            self.stop().await;
        }
    }

    /// Clear the running flag and wait for every loop to exit.
    ///
    /// Each loop gets the configured shutdown timeout; a loop still busy
    /// after that (for example inside a long handler) is not cancelled. It is
    /// left running detached and exits at its next check of the running
    /// flag, so a handler in progress still completes (and may still `ACK`).
    /// Does nothing when the consumer is not running.
    pub async fn stop(&self) {
        let was_running = self.running_tx.send_replace(false);
        let mut tasks = self.tasks.lock().await;

        let pending = tasks.iter().any(|task| task.handle.is_some());
        if !was_running && !pending {
            return;
        }

        info!("Stopping consumer...");
        self.join_tasks(&mut tasks).await;
        info!("Consumer stopped");
    }

    async fn join_tasks(&self, tasks: &mut [ListenerTask]) {
        for task in tasks.iter_mut() {
            let Some(mut handle) = task.handle.take() else {
                continue;
            };

            // Dropping the handle on timeout detaches the task without cancelling it
            match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => debug!(topic = %task.topic, "Listener exited"),
                Ok(Err(e)) => error!(topic = %task.topic, "Listener task failed: {}", e),
                Err(_) => {
                    warn!(
                        topic = %task.topic,
                        "Listener did not stop within {:?}, abandoning it",
                        self.shutdown_timeout
                    );
                }
            }
        }
    }

    /// Handle that stops this consumer from another task or thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running_tx: Arc::clone(&self.running_tx),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Current state of each loop from the latest start, in registration order
    pub async fn loop_states(&self) -> Vec<(String, LoopState)> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|task| (task.topic.clone(), *task.state_rx.borrow()))
            .collect()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }
}

impl<C: Connector> Drop for Consumer<C> {
    fn drop(&mut self) {
        // Detached loops see the flag and wind down on their own
        self.running_tx.send_replace(false);
    }
}

/// Cloneable trigger that clears a consumer's running flag.
///
/// A blocking [`Consumer::start`] notices and performs the full stop;
/// otherwise the owner still calls [`Consumer::stop`] to join the loops.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running_tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running_tx.send_replace(false);
    }

    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }
}

/// Resolve on SIGINT or SIGTERM; a signal that cannot be watched never fires
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
