//! Worker configuration, read from the process environment.
//!
//! Every knob has a default so a worker can start with nothing but the two
//! queue URIs and the ledger table name configured. Values are read once at
//! startup; the resulting [`WorkerConfig`] is immutable and shared read-only
//! by all workflows.

use anyhow::{Context, Result, ensure};
use std::{env, str::FromStr, time::Duration};
use tilesense_derive::context;

/// Environment variable prefix shared by all configuration keys.
const ENV_PREFIX: &str = "TILESENSE_";

/// Retry behavior for remote inference calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
	/// Maximum number of attempts per tile (first try included).
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub base_delay: Duration,
	/// Multiplier applied to the delay after every retry.
	pub factor: f64,
	/// Relative jitter applied to each delay (0.25 = +-25%).
	pub jitter: f64,
	/// Upper bound for a single delay.
	pub max_delay: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			base_delay: Duration::from_millis(200),
			factor: 2.0,
			jitter: 0.25,
			max_delay: Duration::from_secs(10),
		}
	}
}

/// Connection parameters for the model endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
	/// TCP connect timeout.
	pub dial_timeout: Duration,
	/// End-to-end timeout for a single request.
	pub request_timeout: Duration,
	/// Largest accepted encoded tile payload in bytes.
	pub max_payload_bytes: u64,
}

impl Default for EndpointConfig {
	fn default() -> Self {
		Self {
			dial_timeout: Duration::from_secs(10),
			request_timeout: Duration::from_secs(60),
			max_payload_bytes: 6 * 1024 * 1024,
		}
	}
}

/// Immutable per-process worker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
	/// URI of the image request queue.
	pub image_queue_url: String,
	/// URI of the region request queue.
	pub region_queue_url: String,
	/// Name of the job ledger table.
	pub ledger_table: String,
	/// Maximum region edge length in pixels.
	pub region_size: u32,
	/// Concurrent endpoint calls per region.
	pub tile_workers: usize,
	/// Queue message visibility timeout.
	pub visibility_timeout: Duration,
	/// Receive count after which a message is dead-lettered.
	pub max_receive_count: u32,
	/// Region queue polls per image queue poll.
	pub region_poll_weight: u32,
	/// Fraction of failed tiles above which a region is marked ERROR.
	pub region_error_threshold: f64,
	/// Distillation mode applied when a request does not specify one.
	pub default_distillation: String,
	/// Namespace prefix for emitted metrics.
	pub metrics_namespace: String,
	/// Retry behavior for endpoint calls.
	pub retry: RetryConfig,
	/// Endpoint connection parameters.
	pub endpoint: EndpointConfig,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			image_queue_url: String::new(),
			region_queue_url: String::new(),
			ledger_table: "tilesense-jobs".to_string(),
			region_size: 8192,
			tile_workers: 4,
			visibility_timeout: Duration::from_secs(600),
			max_receive_count: 3,
			region_poll_weight: 3,
			region_error_threshold: 0.1,
			default_distillation: "NONE".to_string(),
			metrics_namespace: "tilesense".to_string(),
			retry: RetryConfig::default(),
			endpoint: EndpointConfig::default(),
		}
	}
}

impl WorkerConfig {
	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Reads the configuration from an arbitrary key lookup.
	#[context("reading worker configuration")]
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let defaults = WorkerConfig::default();
		let config = WorkerConfig {
			image_queue_url: get_string(&lookup, "IMAGE_QUEUE", &defaults.image_queue_url),
			region_queue_url: get_string(&lookup, "REGION_QUEUE", &defaults.region_queue_url),
			ledger_table: get_string(&lookup, "LEDGER_TABLE", &defaults.ledger_table),
			region_size: get_parsed(&lookup, "REGION_SIZE", defaults.region_size)?,
			tile_workers: get_parsed(&lookup, "TILE_WORKERS", defaults.tile_workers)?,
			visibility_timeout: Duration::from_secs(get_parsed(
				&lookup,
				"VISIBILITY_TIMEOUT_SECS",
				defaults.visibility_timeout.as_secs(),
			)?),
			max_receive_count: get_parsed(&lookup, "MAX_RECEIVE_COUNT", defaults.max_receive_count)?,
			region_poll_weight: get_parsed(&lookup, "REGION_POLL_WEIGHT", defaults.region_poll_weight)?,
			region_error_threshold: get_parsed(&lookup, "REGION_ERROR_THRESHOLD", defaults.region_error_threshold)?,
			default_distillation: get_string(&lookup, "DISTILLATION", &defaults.default_distillation),
			metrics_namespace: get_string(&lookup, "METRICS_NAMESPACE", &defaults.metrics_namespace),
			retry: RetryConfig {
				max_attempts: get_parsed(&lookup, "RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
				base_delay: Duration::from_millis(get_parsed(
					&lookup,
					"RETRY_BASE_MS",
					defaults.retry.base_delay.as_millis() as u64,
				)?),
				factor: get_parsed(&lookup, "RETRY_FACTOR", defaults.retry.factor)?,
				jitter: get_parsed(&lookup, "RETRY_JITTER", defaults.retry.jitter)?,
				max_delay: Duration::from_millis(get_parsed(
					&lookup,
					"RETRY_CAP_MS",
					defaults.retry.max_delay.as_millis() as u64,
				)?),
			},
			endpoint: EndpointConfig {
				dial_timeout: Duration::from_secs(get_parsed(
					&lookup,
					"ENDPOINT_DIAL_TIMEOUT_SECS",
					defaults.endpoint.dial_timeout.as_secs(),
				)?),
				request_timeout: Duration::from_secs(get_parsed(
					&lookup,
					"ENDPOINT_REQUEST_TIMEOUT_SECS",
					defaults.endpoint.request_timeout.as_secs(),
				)?),
				max_payload_bytes: get_parsed(&lookup, "ENDPOINT_MAX_PAYLOAD_BYTES", defaults.endpoint.max_payload_bytes)?,
			},
		};
		config.validate()?;
		Ok(config)
	}

	/// Checks cross-field constraints.
	#[context("validating worker configuration")]
	pub fn validate(&self) -> Result<()> {
		ensure!(self.region_size > 0, "region size must be > 0");
		ensure!(self.tile_workers > 0, "tile worker pool must be > 0");
		ensure!(self.max_receive_count > 0, "max receive count must be > 0");
		ensure!(
			(0.0..=1.0).contains(&self.region_error_threshold),
			"region error threshold ({}) must be within 0..=1",
			self.region_error_threshold
		);
		ensure!(self.retry.max_attempts > 0, "retry attempts must be > 0");
		Ok(())
	}

	/// Interval at which in-flight message visibility is extended.
	#[must_use]
	pub fn heartbeat_interval(&self) -> Duration {
		self.visibility_timeout / 2
	}
}

fn get_string<F>(lookup: &F, key: &str, default: &str) -> String
where
	F: Fn(&str) -> Option<String>,
{
	lookup(&format!("{ENV_PREFIX}{key}")).unwrap_or_else(|| default.to_string())
}

fn get_parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
	F: Fn(&str) -> Option<String>,
	T: FromStr,
	T::Err: std::error::Error + Send + Sync + 'static,
{
	match lookup(&format!("{ENV_PREFIX}{key}")) {
		Some(value) => value
			.trim()
			.parse::<T>()
			.with_context(|| format!("parsing {ENV_PREFIX}{key}='{value}'")),
		None => Ok(default),
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
