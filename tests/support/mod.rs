#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqs_batch_processor::{
    MessageAttribute, QueueClient, QueueMessage, ReceiveParams, ReceiveResponse,
};
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

pub const QUEUE_NAME: &str = "test_queue_name";
pub const QUEUE_URL: &str = "https://sqs.eu-west-1.amazonaws.com/000000000000/test_queue_name";

/// One scripted answer to a receive call.
#[derive(Debug, Clone)]
pub enum Fetch {
    Messages(Vec<QueueMessage>),
    NoMessageList,
    Invalid,
    Fail,
    /// Fail, but only after the given delay
    FailAfter(Duration),
    Hang,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScriptError(pub &'static str);

/// In-memory queue that answers receive calls from a script and records
/// every call. Once the script runs out every receive hangs.
#[derive(Clone, Default)]
pub struct ScriptedQueue {
    state: Arc<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    script: Mutex<VecDeque<Fetch>>,
    resolve_fails: Mutex<bool>,
    failing_deletes: Mutex<HashSet<String>>,
    fetch_times: Mutex<Vec<Instant>>,
    fetch_params: Mutex<Vec<ReceiveParams>>,
    deleted: Mutex<Vec<String>>,
    delete_attempts: Mutex<usize>,
}

impl ScriptedQueue {
    pub fn new(script: impl IntoIterator<Item = Fetch>) -> Self {
        let queue = Self::default();
        queue.state.script.lock().unwrap().extend(script);
        queue
    }

    pub fn push(&self, fetch: Fetch) {
        self.state.script.lock().unwrap().push_back(fetch);
    }

    pub fn fail_resolve(&self) {
        *self.state.resolve_fails.lock().unwrap() = true;
    }

    pub fn fail_delete_of(&self, receipt_handle: &str) {
        self.state
            .failing_deletes
            .lock()
            .unwrap()
            .insert(receipt_handle.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.state.fetch_times.lock().unwrap().len()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.state.fetch_times.lock().unwrap().clone()
    }

    pub fn fetch_params(&self) -> Vec<ReceiveParams> {
        self.state.fetch_params.lock().unwrap().clone()
    }

    /// Receipt handles of successfully deleted messages, in order
    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }

    pub fn delete_attempts(&self) -> usize {
        *self.state.delete_attempts.lock().unwrap()
    }
}

impl QueueClient for ScriptedQueue {
    type Error = ScriptError;

    async fn resolve_address(&self, queue_name: &str) -> Result<Option<String>, ScriptError> {
        if *self.state.resolve_fails.lock().unwrap() {
            return Err(ScriptError("queue does not exist"));
        }
        assert_eq!(queue_name, QUEUE_NAME);
        Ok(Some(QUEUE_URL.to_string()))
    }

    async fn fetch_batch(
        &self,
        address: &str,
        params: &ReceiveParams,
    ) -> Result<Option<ReceiveResponse>, ScriptError> {
        assert_eq!(address, QUEUE_URL);
        self.state.fetch_times.lock().unwrap().push(Instant::now());
        self.state.fetch_params.lock().unwrap().push(params.clone());

        let next = self.state.script.lock().unwrap().pop_front();
        match next.unwrap_or(Fetch::Hang) {
            Fetch::Messages(messages) => Ok(Some(ReceiveResponse::with_messages(messages))),
            Fetch::NoMessageList => Ok(Some(ReceiveResponse::default())),
            Fetch::Invalid => Ok(None),
            Fetch::Fail => Err(ScriptError("receive failed")),
            Fetch::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(ScriptError("receive failed late"))
            }
            Fetch::Hang => std::future::pending().await,
        }
    }

    async fn delete_message(&self, address: &str, receipt_handle: &str) -> Result<(), ScriptError> {
        assert_eq!(address, QUEUE_URL);
        *self.state.delete_attempts.lock().unwrap() += 1;

        if self
            .state
            .failing_deletes
            .lock()
            .unwrap()
            .contains(receipt_handle)
        {
            return Err(ScriptError("delete failed"));
        }

        self.state
            .deleted
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        Ok(())
    }
}

pub fn message(n: usize) -> QueueMessage {
    QueueMessage::new(format!("id-{n}"), format!("receipt-{n}"), format!("body-{n}"))
}

pub fn message_without_receipt(n: usize) -> QueueMessage {
    QueueMessage {
        receipt_handle: None,
        ..message(n)
    }
}

pub fn receive_params() -> ReceiveParams {
    ReceiveParams {
        max_messages: 10,
        wait_time_seconds: 20,
        visibility_timeout: None,
        attribute_names: vec![MessageAttribute::All],
    }
}

/// Bodies of the messages a handler saw, in call order.
#[derive(Clone, Default)]
pub struct Seen {
    bodies: Arc<Mutex<Vec<String>>>,
}

impl Seen {
    pub fn record(&self, message: &QueueMessage) -> usize {
        let mut bodies = self.bodies.lock().unwrap();
        bodies.push(message.body.clone().unwrap_or_default());
        bodies.len()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// `tracing` layer that keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.message == message)
            .collect()
    }

    pub fn contains(&self, level: Level, message: &str) -> bool {
        self.with_message(message)
            .iter()
            .any(|event| event.level == level)
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

/// Capture events emitted on the current thread until the guard is dropped.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
