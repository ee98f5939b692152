//! Pulse and verifier result records, status code taxonomies, and the
//! exception types that wrap them.
//!
//! Grounded on `original_source/verifier/core/results.py`, with the
//! `ext_value_status` bit test corrected to match SPEC_FULL §8's
//! testable property (`lsbs[i] = true ⇔ (status & (1<<i)) != 0`) rather
//! than the original's `== i` comparison, which never holds for `i > 1`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Status codes for a beacon pulse fetch/extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PulseStatus {
    Ok = 100,
    ExtractionUnsuccessful = 110,
    BeaconValueInvalid = 120,
    Timeout = 130,
    Unknown = 199,
}

impl PulseStatus {
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "pulse_ok",
            Self::ExtractionUnsuccessful => "pulse_extraction_unsuccessful",
            Self::BeaconValueInvalid => "pulse_beacon_value_invalid",
            Self::Timeout => "pulse_timeout",
            Self::Unknown => "pulse_unknown_error",
        }
    }
}

/// Status codes for a single source's verification attempt.
///
/// 231 (`seism_metadata_not_found`) is not in spec.md's own taxonomy
/// table but is used by the seismology source's metadata-lookup branch;
/// see SPEC_FULL §5.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VerifierStatus {
    Ok = 200,
    EmptyMetadata = 210,
    EmptyRawData = 211,
    InvalidExtractionParameters = 220,
    DataDoesNotMatchBuffer = 221,
    DataNotFoundInBuffer = 222,
    SeismValueMismatch = 230,
    SeismMetadataNotFound = 231,
    WrongStatusCode = 240,
    Timeout = 250,
    Unknown = 299,
}

impl VerifierStatus {
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "verifier_ok",
            Self::EmptyMetadata => "verifier_empty_metadata",
            Self::EmptyRawData => "verifier_empty_raw_data",
            Self::InvalidExtractionParameters => "verifier_invalid_for_extraction_parameters",
            Self::DataDoesNotMatchBuffer => "verifier_data_does_not_match_with_buffer",
            Self::DataNotFoundInBuffer => "verifier_data_not_found_in_buffer",
            Self::SeismValueMismatch => "verifier_seism_value_mismatch",
            Self::SeismMetadataNotFound => "verifier_seism_metadata_not_found",
            Self::WrongStatusCode => "verifier_wrong_status_code",
            Self::Timeout => "verifier_timeout",
            Self::Unknown => "verifier_unknown_error",
        }
    }
}

/// Bit positions within `ext_value_status` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtValueBit {
    FirstPulseOfChain = 0,
    ExtractionError = 1,
    RepeatedEvent = 2,
    AltSource = 3,
}

const EXT_VALUE_BITS: [(ExtValueBit, &str); 4] = [
    (ExtValueBit::FirstPulseOfChain, "first_pulse_of_chain"),
    (ExtValueBit::ExtractionError, "extraction_error"),
    (ExtValueBit::RepeatedEvent, "repeated_event"),
    (ExtValueBit::AltSource, "alt_source"),
];

/// Result of fetching and extracting a single pulse from the beacon.
#[derive(Debug, Clone)]
pub struct PulseResult {
    pub pulse_url: String,
    pub status: PulseStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub detail: Vec<String>,
}

impl PulseResult {
    #[must_use]
    pub fn new(pulse_url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            pulse_url: pulse_url.into(),
            status: PulseStatus::Ok,
            start_time: now,
            end_time: now,
            detail: Vec::new(),
        }
    }

    /// `true` iff `statusCode mod 100 == 0` (spec.md §3).
    #[must_use]
    pub fn valid(&self) -> bool {
        self.status.code() % 100 == 0
    }

    /// Parses the numeric pulse id from the trailing URL path segment.
    #[must_use]
    pub fn pulse_id(&self) -> Option<u64> {
        self.pulse_url.rsplit('/').next()?.parse().ok()
    }

    /// Parses the numeric chain id from the URL's third-from-last
    /// path segment.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        self.pulse_url.rsplit('/').nth(2)?.parse().ok()
    }

    #[must_use]
    pub fn running_time(&self) -> f64 {
        (self.end_time - self.start_time).as_seconds_f64_like()
    }

    pub fn add_detail(&mut self, detail: impl Into<String>) {
        self.detail.push(detail.into());
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.end_time = now;
    }

    /// The externally-reported JSON shape (spec.md §6's `pulse` object).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.pulse_id(),
            "chain": self.chain_id(),
            "pulse_url": self.pulse_url,
            "valid": self.valid(),
            "status_code": self.status.code(),
            "running_time": self.running_time(),
            "reason": self.status.reason(),
            "detail": self.detail,
        })
    }
}

/// Result of one source's verification against a single pulse.
#[derive(Debug, Clone)]
pub struct VerifierResult {
    pub scope: String,
    pub ext_value_status: u32,
    pub status: VerifierStatus,
    pub possible: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub detail: Vec<String>,
}

impl VerifierResult {
    #[must_use]
    pub fn new(scope: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            scope: scope.into(),
            ext_value_status: 0,
            status: VerifierStatus::Ok,
            possible: 0,
            start_time: now,
            end_time: now,
            detail: Vec::new(),
        }
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.status.code() % 100 == 0
    }

    pub fn add_detail(&mut self, detail: impl Into<String>) {
        self.detail.push(detail.into());
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.end_time = now;
    }

    #[must_use]
    pub fn running_time(&self) -> f64 {
        (self.end_time - self.start_time).as_seconds_f64_like()
    }

    /// Renders `ext_value_status` into `{name -> bool}`, one entry per
    /// known bit: `lsbs[i] = true ⇔ (status & (1 << i)) != 0`.
    #[must_use]
    pub fn ext_value_map(&self) -> HashMap<&'static str, bool> {
        EXT_VALUE_BITS
            .iter()
            .map(|(bit, name)| (*name, self.ext_value_status & (1 << (*bit as u32)) != 0))
            .collect()
    }

    /// `true` if bit 1 (`extraction_error`) is set; forces status 240
    /// regardless of any other bit (spec.md §7).
    #[must_use]
    pub fn has_extraction_error(&self) -> bool {
        self.ext_value_status & (1 << ExtValueBit::ExtractionError as u32) != 0
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.valid(),
            "ext_value_status": self.ext_value_map(),
            "possible": self.possible,
            "running_time": self.running_time(),
            "reason": self.status.reason(),
            "detail": self.detail,
        })
    }
}

/// Wraps a [`VerifierResult`] as the manager's uniform verify-task
/// error channel (`verify()` never panics; see SPEC_FULL §9).
#[derive(Debug, Clone, thiserror::Error)]
#[error("verifier result for {}: {}", .0.scope, .0.status.reason())]
pub struct VerifierException(pub VerifierResult);

/// Wraps a [`PulseResult`] analogously for pulse-fetch failures.
#[derive(Debug, Clone, thiserror::Error)]
#[error("pulse result for {}: {}", .0.pulse_url, .0.status.reason())]
pub struct PulseException(pub PulseResult);

trait DurationSecondsF64 {
    fn as_seconds_f64_like(&self) -> f64;
}

impl DurationSecondsF64 for chrono::Duration {
    fn as_seconds_f64_like(&self) -> f64 {
        self.num_milliseconds() as f64 / 1000.0
    }
}
