//! Error classification for the orchestration engine.
//!
//! Retry decisions are driven by an explicit error class carried through the
//! `anyhow` chain, not by matching on error text. Unclassified errors default
//! to [`ErrorClass::TransientIo`] so that unknown failures are redelivered
//! rather than silently dropped.

use std::fmt::{self, Display};
use tilesense_image::UnsupportedEncoding;

/// The failure kinds of the engine, each with a fixed retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// Bad request. Permanent: the job is marked FAILED and the message acked.
	Validation,
	/// The image cannot be opened. Permanent, like `Validation`.
	Decode,
	/// Queue/ledger/sink I/O. Retried via queue visibility redelivery.
	TransientIo,
	/// The endpoint asked us to back off. Retried locally with backoff.
	Throttle,
	/// Endpoint rejected the tile (4xx). The tile is dropped.
	EndpointPermanent,
	/// Encoded tile payload exceeds the endpoint limit. The tile is dropped.
	Oversize,
	/// A coordinate lift failed. Non-fatal, the feature keeps a null geometry.
	Lift,
}

impl ErrorClass {
	/// Permanent failures mark the record FAILED and ack the message;
	/// transient ones are left for redelivery.
	#[must_use]
	pub fn is_permanent(&self) -> bool {
		matches!(
			self,
			ErrorClass::Validation | ErrorClass::Decode | ErrorClass::EndpointPermanent | ErrorClass::Oversize
		)
	}
}

impl Display for ErrorClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ErrorClass::Validation => "validation",
			ErrorClass::Decode => "decode",
			ErrorClass::TransientIo => "transient-io",
			ErrorClass::Throttle => "throttle",
			ErrorClass::EndpointPermanent => "endpoint-permanent",
			ErrorClass::Oversize => "oversize",
			ErrorClass::Lift => "lift",
		})
	}
}

/// An error tagged with its [`ErrorClass`].
#[derive(Debug)]
pub struct ClassifiedError {
	pub class: ErrorClass,
	source: anyhow::Error,
}

impl ClassifiedError {
	/// Wraps an error with a class, preserving the original chain.
	#[must_use]
	pub fn wrap(class: ErrorClass, source: anyhow::Error) -> anyhow::Error {
		anyhow::Error::new(ClassifiedError { class, source })
	}

	/// Creates a classified error from a message.
	#[must_use]
	pub fn new(class: ErrorClass, message: &str) -> anyhow::Error {
		Self::wrap(class, anyhow::anyhow!("{message}"))
	}
}

impl Display for ClassifiedError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} error: {}", self.class, self.source)
	}
}

impl std::error::Error for ClassifiedError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(self.source.as_ref())
	}
}

/// Determines the class of an error chain.
///
/// Encoding gaps surfaced by the codec are permanent endpoint failures; any
/// error without an explicit class is treated as transient I/O.
#[must_use]
pub fn classify(error: &anyhow::Error) -> ErrorClass {
	if let Some(classified) = error.downcast_ref::<ClassifiedError>() {
		return classified.class;
	}
	if error.downcast_ref::<UnsupportedEncoding>().is_some() {
		return ErrorClass::EndpointPermanent;
	}
	ErrorClass::TransientIo
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
