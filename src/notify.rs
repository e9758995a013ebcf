use crate::alert::DispatchRequest;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// A side-effecting alert action (sound, email, ...). Called on a blocking
/// worker thread, never on the frame thread.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, request: &DispatchRequest) -> Result<()>;
}

/// Receiver of dispatch requests from the frame loop. Must not block.
pub trait AlertSink {
    fn submit(&mut self, request: DispatchRequest);
}

/// Writes every alert to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, request: &DispatchRequest) -> Result<()> {
        tracing::warn!(
            zone = %request.zone_name,
            count = request.count,
            raised_at = %request.raised_at.format("%Y-%m-%d %H:%M:%S"),
            "overcrowding alert"
        );
        Ok(())
    }
}

/// Runs notifiers off the frame path. The frame loop only enqueues into a
/// bounded queue; a worker task fans each request out to every notifier on
/// its own blocking task, so one slow or failing notifier never delays or
/// breaks another. Calls to the same notifier run one at a time.
pub struct NotificationDispatcher {
    sender: Option<mpsc::Sender<DispatchRequest>>,
    worker: JoinHandle<()>,
    dropped: u64,
}

impl NotificationDispatcher {
    pub fn spawn(notifiers: Vec<Arc<dyn Notifier>>, capacity: usize, runtime: &Handle) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = runtime.spawn(run_worker(notifiers, receiver));
        Self {
            sender: Some(sender),
            worker,
            dropped: 0,
        }
    }

    /// Requests lost because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Closes the queue and waits up to `grace` for queued and in-flight
    /// notifications to finish.
    pub async fn shutdown(mut self, grace: Duration) {
        self.sender.take();
        match tokio::time::timeout(grace, &mut self.worker).await {
            Ok(Ok(())) => tracing::debug!("notification worker finished"),
            Ok(Err(e)) => tracing::error!(error = %e, "notification worker failed"),
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs_f64(), "abandoning unfinished notifications");
                self.worker.abort();
            }
        }
    }
}

impl AlertSink for NotificationDispatcher {
    fn submit(&mut self, request: DispatchRequest) {
        let Some(sender) = &self.sender else {
            self.dropped += 1;
            return;
        };
        match sender.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                self.dropped += 1;
                tracing::warn!(zone = %request.zone_name, count = request.count, "notification queue full, alert dropped");
            }
            Err(TrySendError::Closed(request)) => {
                self.dropped += 1;
                tracing::error!(zone = %request.zone_name, "notification worker gone, alert dropped");
            }
        }
    }
}

async fn run_worker(notifiers: Vec<Arc<dyn Notifier>>, mut receiver: mpsc::Receiver<DispatchRequest>) {
    // one permit per notifier: a notifier never runs twice at once, so alert
    // sounds queue up instead of playing over each other
    let gates: Vec<Arc<Semaphore>> = notifiers.iter().map(|_| Arc::new(Semaphore::new(1))).collect();
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            request = receiver.recv() => {
                let Some(request) = request else { break };
                tracing::info!(zone = %request.zone_name, count = request.count, "dispatching alert");
                for (notifier, gate) in notifiers.iter().zip(&gates) {
                    in_flight.spawn(run_notifier(Arc::clone(notifier), Arc::clone(gate), request.clone()));
                }
            }
            Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => log_finished(finished),
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        log_finished(finished);
    }
}

async fn run_notifier(notifier: Arc<dyn Notifier>, gate: Arc<Semaphore>, request: DispatchRequest) -> Result<(), JoinError> {
    // the semaphore is never closed
    let _permit = gate.acquire_owned().await;
    tokio::task::spawn_blocking(move || {
        if let Err(e) = notifier.notify(&request) {
            tracing::warn!(
                notifier = notifier.name(),
                zone = %request.zone_name,
                error = %e,
                "notification failed"
            );
        }
    })
    .await
}

fn log_finished(finished: Result<Result<(), JoinError>, JoinError>) {
    if let Err(e) = finished.and_then(|inner| inner) {
        tracing::error!(error = %e, "notifier panicked");
    }
}
