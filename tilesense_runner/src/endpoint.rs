//! The model endpoint client.
//!
//! Encodes a tile's pixel buffer into the requested payload format, posts it
//! to the model's `/invocations` URL and parses the GeoJSON FeatureCollection
//! response. Connection errors, 5xx and 429 are retried with exponential
//! backoff and jitter; throttles, retries and terminal errors feed the
//! `ModelInvocation` metrics scope an external autoscaler may observe.

use crate::{ClassifiedError, ErrorClass, ModelEndpoint, request::EndpointKind};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use image::DynamicImage;
use log::{debug, warn};
use rand::Rng;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use std::{
	sync::Arc,
	time::{Duration, Instant},
};
use tilesense_core::{MetricsRegistry, Operation, RetryConfig, TileDescriptor, WorkerConfig};
use tilesense_derive::context;
use tilesense_geometry::FeatureCollection;
use tilesense_image::encode_tile;

/// Invokes the remote model for one tile.
#[async_trait]
pub trait ModelClient: Send + Sync {
	async fn invoke(
		&self,
		endpoint: &ModelEndpoint,
		tile: &TileDescriptor,
		pixels: &DynamicImage,
	) -> Result<FeatureCollection>;
}

/// How a failed attempt is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttemptFailure {
	/// 429 or an explicit backpressure signal.
	Throttled,
	/// Connection error or 5xx.
	Transient,
}

/// The reqwest-backed [`ModelClient`].
pub struct HttpModelClient {
	client: reqwest::Client,
	retry: RetryConfig,
	max_payload_bytes: u64,
	metrics: Arc<MetricsRegistry>,
}

impl HttpModelClient {
	/// Builds the client from the worker configuration.
	#[context("building model endpoint client")]
	pub fn new(config: &WorkerConfig, metrics: Arc<MetricsRegistry>) -> Result<Self> {
		let client = reqwest::Client::builder()
			.connect_timeout(config.endpoint.dial_timeout)
			.timeout(config.endpoint.request_timeout)
			.build()?;
		Ok(Self {
			client,
			retry: config.retry.clone(),
			max_payload_bytes: config.endpoint.max_payload_bytes,
			metrics,
		})
	}
}

#[async_trait]
impl ModelClient for HttpModelClient {
	async fn invoke(
		&self,
		endpoint: &ModelEndpoint,
		tile: &TileDescriptor,
		pixels: &DynamicImage,
	) -> Result<FeatureCollection> {
		self.invoke_http(endpoint, tile, pixels).await
	}
}

impl HttpModelClient {
	#[context("invoking model '{}' for tile {}", endpoint.name, tile.rect)]
	async fn invoke_http(
		&self,
		endpoint: &ModelEndpoint,
		tile: &TileDescriptor,
		pixels: &DynamicImage,
	) -> Result<FeatureCollection> {
		let EndpointKind::Http = endpoint.kind;
		let scope = self
			.metrics
			.scope(Operation::ModelInvocation, &endpoint.name, &tile.format.to_string());

		// Encoding is deterministic, so any failure here is permanent.
		let payload = encode_tile(pixels, tile.format, tile.compression)
			.map_err(|e| ClassifiedError::wrap(ErrorClass::EndpointPermanent, e))?;
		if payload.len() > self.max_payload_bytes {
			scope.inc_errors();
			return Err(ClassifiedError::new(
				ErrorClass::Oversize,
				&format!(
					"encoded tile payload of {} bytes exceeds the {} byte limit",
					payload.len(),
					self.max_payload_bytes
				),
			));
		}

		let url = endpoint.invocation_url();
		let body = payload.into_vec();
		let mut last_failure = anyhow!("no attempt made");

		for attempt in 1..=self.retry.max_attempts {
			scope.inc_invocations();
			let started = Instant::now();

			let failure = match self
				.client
				.post(&url)
				.header(CONTENT_TYPE, tile.format.content_type())
				.body(body.clone())
				.send()
				.await
			{
				Ok(response) => {
					let status = response.status();
					if status.is_success() {
						let text = response.text().await.map_err(|e| {
							scope.inc_errors();
							ClassifiedError::wrap(ErrorClass::EndpointPermanent, e.into())
						})?;
						let collection = FeatureCollection::from_json_str(&text).map_err(|e| {
							scope.inc_errors();
							ClassifiedError::wrap(ErrorClass::EndpointPermanent, e)
						})?;
						scope.observe_duration(started.elapsed());
						return Ok(collection);
					}
					if status == StatusCode::TOO_MANY_REQUESTS {
						scope.inc_throttles();
						last_failure = anyhow!("endpoint throttled the request (429)");
						AttemptFailure::Throttled
					} else if status.is_server_error() {
						last_failure = anyhow!("endpoint returned {status}");
						AttemptFailure::Transient
					} else {
						// Non-429 4xx: the endpoint rejected this tile for good.
						scope.inc_errors();
						return Err(ClassifiedError::new(
							ErrorClass::EndpointPermanent,
							&format!("endpoint rejected the tile with {status}"),
						));
					}
				}
				Err(error) => {
					last_failure = anyhow!("request failed: {error}");
					AttemptFailure::Transient
				}
			};

			if attempt == self.retry.max_attempts {
				break;
			}
			let delay = backoff_delay(&self.retry, attempt);
			debug!(
				"attempt {attempt}/{} against '{url}' failed ({failure:?}), retrying in {delay:?}",
				self.retry.max_attempts
			);
			scope.inc_retries();
			tokio::time::sleep(delay).await;
		}

		scope.inc_errors();
		warn!("giving up on tile {} after {} attempts", tile.rect, self.retry.max_attempts);
		Err(ClassifiedError::wrap(
			ErrorClass::EndpointPermanent,
			last_failure.context(format!("no successful response after {} attempts", self.retry.max_attempts)),
		))
	}
}

/// The delay before retry number `attempt + 1`: exponential growth from the
/// base delay, capped, with relative jitter applied.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
	let exponential = retry.base_delay.as_secs_f64() * retry.factor.powi(attempt.saturating_sub(1) as i32);
	let capped = exponential.min(retry.max_delay.as_secs_f64());
	let jitter = rand::rng().random_range(-retry.jitter..=retry.jitter);
	Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
