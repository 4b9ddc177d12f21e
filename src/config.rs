//! Processor configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::message::MessageAttribute;
use crate::queue::ReceiveParams;

pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_BATCH_FORCE_THRESHOLD: u32 = 5;
pub const DEFAULT_WAIT_TIME_SECONDS: u32 = 20;
pub const DEFAULT_MAX_NOF_MESSAGES: u32 = 10;

pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u32 = 43_200;
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;
pub const MAX_NOF_MESSAGES: u32 = 10;

/// Configuration for a [`Processor`](crate::Processor)
///
/// One processor serves exactly one queue. Every field except `queue_name`
/// has a default, so the usual way to build one is [`ProcessorConfig::new`]
/// followed by the `with_*` setters. It can also be deserialized, in which
/// case the batch timeout is read from `batch_timeout_ms`.
///
/// # Examples
///
/// ```rust
/// use sqs_batch_processor::ProcessorConfig;
/// use std::time::Duration;
///
/// let config = ProcessorConfig::new("orders")
///     .with_batch_timeout(Duration::from_secs(30))
///     .with_max_nof_messages(5);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProcessorConfig {
    /// Name of the queue to consume
    pub queue_name: String,
    /// AWS region the queue lives in. Only used when the processor builds its own SQS client.
    /// Default: eu-west-1
    #[serde(default = "default_region")]
    pub region: String,
    /// Time a single batch may take before the watchdog forces the next one
    /// Default: 60 seconds
    #[serde(
        rename = "batch_timeout_ms",
        default = "default_batch_timeout",
        deserialize_with = "duration_from_millis"
    )]
    pub batch_timeout: Duration,
    /// Number of consecutive forced batches tolerated before the processor gives up
    /// Default: 5
    #[serde(default = "default_batch_force_threshold")]
    pub batch_force_threshold: u32,
    /// Visibility timeout in seconds requested on receive. `None` keeps the queue's own setting.
    #[serde(default)]
    pub visibility_timeout: Option<u32>,
    /// Long-polling wait in seconds (0 = short polling)
    /// Default: 20
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: u32,
    /// Max messages to receive per request
    /// Default: 10
    #[serde(default = "default_max_nof_messages")]
    pub max_nof_messages: u32,
    /// Attributes to be returned along with each message
    /// Default: [All]
    #[serde(default = "default_attribute_names")]
    pub attribute_names: Vec<MessageAttribute>,
}

impl ProcessorConfig {
    /// Create a configuration for `queue_name` with every other value defaulted
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            region: default_region(),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            batch_force_threshold: DEFAULT_BATCH_FORCE_THRESHOLD,
            visibility_timeout: None,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            max_nof_messages: DEFAULT_MAX_NOF_MESSAGES,
            attribute_names: default_attribute_names(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_batch_force_threshold(mut self, threshold: u32) -> Self {
        self.batch_force_threshold = threshold;
        self
    }

    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn with_wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = seconds;
        self
    }

    pub fn with_max_nof_messages(mut self, max: u32) -> Self {
        self.max_nof_messages = max;
        self
    }

    pub fn with_attribute_names(mut self, names: Vec<MessageAttribute>) -> Self {
        self.attribute_names = names;
        self
    }

    /// Check every field against the limits the queue service accepts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::EmptyQueueName);
        }

        if self.region.trim().is_empty() {
            return Err(ConfigError::EmptyRegion);
        }

        match self.visibility_timeout {
            Some(provided) if provided > MAX_VISIBILITY_TIMEOUT_SECONDS => {
                return Err(ConfigError::VisibilityTimeoutOutOfRange {
                    provided,
                    max: MAX_VISIBILITY_TIMEOUT_SECONDS,
                });
            }
            _ => {}
        }

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigError::WaitTimeOutOfRange {
                provided: self.wait_time_seconds,
                max: MAX_WAIT_TIME_SECONDS,
            });
        }

        if !(1..=MAX_NOF_MESSAGES).contains(&self.max_nof_messages) {
            return Err(ConfigError::MaxMessagesOutOfRange {
                provided: self.max_nof_messages,
                min: 1,
                max: MAX_NOF_MESSAGES,
            });
        }

        Ok(())
    }

    /// Parameters sent with every receive call.
    ///
    /// A visibility timeout of zero counts as unset.
    pub fn receive_params(&self) -> ReceiveParams {
        ReceiveParams {
            max_messages: self.max_nof_messages,
            wait_time_seconds: self.wait_time_seconds,
            visibility_timeout: self.visibility_timeout.filter(|seconds| *seconds > 0),
            attribute_names: self.attribute_names.clone(),
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_batch_timeout() -> Duration {
    DEFAULT_BATCH_TIMEOUT
}

fn default_batch_force_threshold() -> u32 {
    DEFAULT_BATCH_FORCE_THRESHOLD
}

fn default_wait_time_seconds() -> u32 {
    DEFAULT_WAIT_TIME_SECONDS
}

fn default_max_nof_messages() -> u32 {
    DEFAULT_MAX_NOF_MESSAGES
}

fn default_attribute_names() -> Vec<MessageAttribute> {
    vec![MessageAttribute::All]
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
