//! Wall-clock helpers shared by records and feature pedigree.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_epoch_ms() -> u64 {
	let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
	(nanos / 1_000_000).max(0) as u64
}

/// Current time as an RFC 3339 string.
#[must_use]
pub fn now_rfc3339() -> String {
	OffsetDateTime::now_utc()
		.format(&Rfc3339)
		.unwrap_or_else(|_| String::new())
}
