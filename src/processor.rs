//! The loop that keeps receiving batches until it is told to stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::capture::{BatchCapture, BatchSummary};
use crate::config::ProcessorConfig;
use crate::error::{ConfigError, QueueError, ThresholdExceeded};
use crate::handler::MessageHandler;
use crate::queue::{MessageQueue, QueueClient};
use crate::timeout::{BatchWatchdog, Expiry, WatchdogStop};

/// Delay before the next batch after a failed receive
pub const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

const FATAL_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LoopState {
    /// Set by start, cleared by stop
    running: bool,
    /// A batch loop task exists and has not yet observed `running == false`
    active: bool,
}

/// What the batch loop does after an iteration.
#[derive(Debug)]
enum NextStep {
    Immediate,
    Backoff,
    Halt(ThresholdExceeded),
}

/// Shared by the two things that can end an iteration: the batch finishing and
/// the watchdog expiring. Whichever comes first decides the next step; the
/// other one only does its own cleanup.
struct BatchIteration {
    handled: AtomicBool,
    next: mpsc::UnboundedSender<NextStep>,
}

impl BatchIteration {
    fn new(next: mpsc::UnboundedSender<NextStep>) -> Self {
        Self {
            handled: AtomicBool::new(false),
            next,
        }
    }

    /// Returns true if this call is the first to claim the iteration.
    fn claim(&self) -> bool {
        !self.handled.swap(true, Ordering::SeqCst)
    }

    fn on_timeout(&self, expiry: Expiry) {
        if !self.claim() {
            return;
        }

        let step = match expiry {
            Ok(()) => NextStep::Immediate,
            Err(err) => NextStep::Halt(err),
        };
        let _ = self.next.send(step);
    }

    fn on_done(
        &self,
        queue_name: &str,
        result: Result<BatchSummary, QueueError>,
        stop: &WatchdogStop,
    ) {
        let first = self.claim();
        stop.stop();

        let step = match result {
            Ok(_) => NextStep::Immediate,
            Err(e) => {
                tracing::trace!(
                    queue = queue_name,
                    error = %e,
                    backoff_ms = FETCH_ERROR_BACKOFF.as_millis() as u64,
                    "receive next batch failed, delaying next batch"
                );
                NextStep::Backoff
            }
        };

        if first {
            let _ = self.next.send(step);
        }
    }
}

/// Consumes one queue, batch after batch.
///
/// Each iteration receives one batch, hands every message to the
/// [`MessageHandler`] and deletes the messages that were handled successfully.
/// A watchdog guards every iteration: if a batch takes longer than
/// [`ProcessorConfig::batch_timeout`] the next batch is started anyway, and after
/// more than [`ProcessorConfig::batch_force_threshold`] such forced batches in a
/// row the processor halts and reports [`ThresholdExceeded`] to every
/// [`subscribe`](Self::subscribe)r.
///
/// Receive failures are retried after [`FETCH_ERROR_BACKOFF`], forever.
///
/// `Processor` is a cheap handle; clones control the same loop.
///
/// # Examples
///
/// ```rust
/// use sqs_batch_processor::{
///     handler_fn, BoxError, Processor, ProcessorConfig, QueueClient, QueueMessage,
///     ReceiveParams, ReceiveResponse,
/// };
///
/// # struct MyQueue;
/// # impl QueueClient for MyQueue {
/// #     type Error = std::io::Error;
/// #     async fn resolve_address(&self, name: &str) -> Result<Option<String>, Self::Error> { Ok(Some(name.to_string())) }
/// #     async fn fetch_batch(&self, _: &str, _: &ReceiveParams) -> Result<Option<ReceiveResponse>, Self::Error> { Ok(Some(ReceiveResponse::default())) }
/// #     async fn delete_message(&self, _: &str, _: &str) -> Result<(), Self::Error> { Ok(()) }
/// # }
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = handler_fn(|message: QueueMessage| async move {
///     println!("got {:?}", message.body);
///     Ok::<(), BoxError>(())
/// });
///
/// let processor = Processor::new(MyQueue, handler, ProcessorConfig::new("orders"))?;
/// let mut fatal = processor.subscribe();
///
/// processor.start_processing_queue();
///
/// tokio::select! {
///     _ = tokio::signal::ctrl_c() => processor.stop_after_current_batch(),
///     Ok(err) = fatal.recv() => eprintln!("processor gave up: {err}"),
/// }
/// processor.stopped().await;
/// # Ok(())
/// # }
/// ```
pub struct Processor<C, H> {
    inner: Arc<Inner<C, H>>,
}

impl<C, H> Clone for Processor<C, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C, H> {
    queue_name: String,
    capture: Arc<BatchCapture<C, H>>,
    watchdog: BatchWatchdog,
    state: Arc<watch::Sender<LoopState>>,
    fatal: broadcast::Sender<ThresholdExceeded>,
}

/// Stops a [`Processor`] without needing its type, e.g. from inside a handler.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<watch::Sender<LoopState>>,
}

impl StopHandle {
    /// Same as [`Processor::stop_after_current_batch`]
    pub fn stop_after_current_batch(&self) {
        self.state.send_if_modified(|state| {
            let was_running = state.running;
            state.running = false;
            was_running
        });
    }
}

impl<C, H> Processor<C, H>
where
    C: QueueClient + Send + Sync + 'static,
    H: MessageHandler + Send + Sync + 'static,
{
    /// Create a processor for `config.queue_name`.
    ///
    /// The configuration is validated here; the processor never changes it afterwards.
    pub fn new(client: C, handler: H, config: ProcessorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = MessageQueue::new(client, config.receive_params());
        let (state, _) = watch::channel(LoopState::default());
        let (fatal, _) = broadcast::channel(FATAL_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                watchdog: BatchWatchdog::from_config(&config),
                queue_name: config.queue_name,
                capture: Arc::new(BatchCapture::new(queue, handler)),
                state: Arc::new(state),
                fatal,
            }),
        })
    }

    /// Start receiving batches. Does nothing if the processor is already running.
    ///
    /// Must be called from within a tokio runtime. If the processor was stopped
    /// but its last batch is still in flight, the existing loop simply carries on.
    pub fn start_processing_queue(&self) {
        let mut spawn_loop = false;

        self.inner.state.send_if_modified(|state| {
            if state.running {
                return false;
            }
            state.running = true;
            if !state.active {
                state.active = true;
                spawn_loop = true;
            }
            true
        });

        if spawn_loop {
            tracing::info!(queue = %self.inner.queue_name, "starting batch loop");
            tokio::spawn(Arc::clone(&self.inner).run());
        }
    }

    /// Ask the processor to stop once the batch in flight is done.
    ///
    /// Nothing in flight is cancelled; expect one more batch to complete.
    pub fn stop_after_current_batch(&self) {
        self.stop_handle().stop_after_current_batch();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Arc::clone(&self.inner.state),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().running
    }

    /// Wait until the batch loop has halted, either after a stop or a fatal error.
    pub async fn stopped(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|state| !state.active).await;
    }

    /// Receive the fatal [`ThresholdExceeded`] error, delivered once per loop run.
    pub fn subscribe(&self) -> broadcast::Receiver<ThresholdExceeded> {
        self.inner.fatal.subscribe()
    }

    /// Consecutive forced batches so far
    pub fn force_count(&self) -> u32 {
        self.inner.watchdog.force_count()
    }

    pub fn queue_name(&self) -> &str {
        &self.inner.queue_name
    }
}

impl<C, H> Inner<C, H>
where
    C: QueueClient + Send + Sync + 'static,
    H: MessageHandler + Send + Sync + 'static,
{
    async fn run(self: Arc<Self>) {
        loop {
            if !self.keep_running() {
                tracing::info!(queue = %self.queue_name, "stopping batch loop, processor was stopped");
                return;
            }

            match self.receive_next_batch().await {
                NextStep::Immediate => tokio::task::yield_now().await,
                NextStep::Backoff => tokio::time::sleep(FETCH_ERROR_BACKOFF).await,
                NextStep::Halt(err) => {
                    self.halt(err);
                    return;
                }
            }
        }
    }

    /// Marks the loop inactive in the same step that observes a stop, so a
    /// concurrent start either sees the live loop or spawns a new one.
    fn keep_running(&self) -> bool {
        let mut keep = false;
        self.state.send_if_modified(|state| {
            if state.running {
                keep = true;
                return false;
            }
            state.active = false;
            true
        });
        keep
    }

    /// Run one iteration: arm the watchdog, spawn the batch and wait for
    /// whichever of the two finishes first.
    ///
    /// The batch runs in its own task so that a forced recovery leaves it
    /// running. When it finishes late it still stops its watchdog but does not
    /// start another batch.
    async fn receive_next_batch(&self) -> NextStep {
        let (next_tx, mut next_rx) = mpsc::unbounded_channel();
        let iteration = Arc::new(BatchIteration::new(next_tx));

        let stop = self.watchdog.start({
            let iteration = Arc::clone(&iteration);
            move |expiry| iteration.on_timeout(expiry)
        });

        let capture = Arc::clone(&self.capture);
        let queue_name = self.queue_name.clone();
        tokio::spawn(async move {
            let result = capture.receive_message_batch(&queue_name).await;
            iteration.on_done(&queue_name, result, &stop);
        });

        match next_rx.recv().await {
            Some(step) => step,
            None => {
                tracing::error!(queue = %self.queue_name, "batch iteration ended without completing");
                NextStep::Backoff
            }
        }
    }

    fn halt(&self, err: ThresholdExceeded) {
        tracing::error!(
            queue = %self.queue_name,
            forced = err.forced,
            threshold = err.threshold,
            error = %err,
            "batch watchdog exceeded threshold, halting processor"
        );

        self.state.send_modify(|state| {
            state.running = false;
            state.active = false;
        });

        if self.fatal.send(err).is_err() {
            tracing::warn!(queue = %self.queue_name, "no subscriber for fatal processor error");
        }
    }
}
