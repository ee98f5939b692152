//! Seismology event record.
//!
//! Grounded on `original_source/verifier/earthquake/event.py`: equality
//! and the marker are both over the six raw string fields joined with
//! `;` — depth and magnitude are kept as the already-split first token
//! of their source column, not reparsed into numbers, so the canonical
//! form matches the beacon byte-for-byte.

use chrono::NaiveDateTime;
use sha3::{Digest, Sha3_512};

/// A single seismology bulletin row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeismEvent {
    pub id: String,
    pub date_str: String,
    pub date: NaiveDateTime,
    pub lat: String,
    pub long: String,
    pub depth: String,
    pub magnitude: String,
}

/// Error parsing a bulletin row's timestamp.
#[derive(Debug, thiserror::Error)]
#[error("invalid seismology timestamp {0:?}: {1}")]
pub struct SeismDateError(String, chrono::ParseError);

impl SeismEvent {
    /// Construct an event, parsing `date` in the bulletin's
    /// `HH:MM:SS dd/mm/yyyy` format.
    ///
    /// # Errors
    /// Returns a [`SeismDateError`] if `date` cannot be parsed.
    pub fn new(
        id: impl Into<String>,
        date_str: impl Into<String>,
        lat: impl Into<String>,
        long: impl Into<String>,
        depth: impl Into<String>,
        magnitude: impl Into<String>,
    ) -> Result<Self, SeismDateError> {
        let date_str = date_str.into();
        let date = NaiveDateTime::parse_from_str(&date_str, "%H:%M:%S %d/%m/%Y")
            .map_err(|e| SeismDateError(date_str.clone(), e))?;
        Ok(Self {
            id: id.into(),
            date_str,
            date,
            lat: lat.into(),
            long: long.into(),
            depth: depth.into(),
            magnitude: magnitude.into(),
        })
    }

    /// `id;date;lat;long;depth;magnitude`, the exact bytes the beacon's
    /// `raw` is compared against.
    #[must_use]
    pub fn canonical_form(&self) -> Vec<u8> {
        [
            &self.id,
            &self.date_str,
            &self.lat,
            &self.long,
            &self.depth,
            &self.magnitude,
        ]
        .join(";")
        .into_bytes()
    }

    #[must_use]
    pub fn marker(&self) -> String {
        hex::encode(Sha3_512::digest(self.canonical_form()))
    }

    /// Ordering key used by the heap buffer: `(date, id)`.
    #[must_use]
    pub fn heap_key(&self) -> (NaiveDateTime, String) {
        (self.date, self.id.clone())
    }

    /// `true` if this event's id carries the `erb_` prefix used by some
    /// upstream feeds for a distinct event class (see SPEC_FULL §5.4 —
    /// these are still buffered, just logged).
    #[must_use]
    pub fn is_erb(&self) -> bool {
        self.id.starts_with("erb_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_joins_with_semicolons() {
        let ev = SeismEvent::new("s1", "12:00:00 01/01/2025", "-33", "-70", "10", "4.5").unwrap();
        assert_eq!(
            String::from_utf8(ev.canonical_form()).unwrap(),
            "s1;12:00:00 01/01/2025;-33;-70;10;4.5"
        );
    }

    #[test]
    fn marker_is_128_hex_chars() {
        let ev = SeismEvent::new("s1", "12:00:00 01/01/2025", "-33", "-70", "10", "4.5").unwrap();
        assert_eq!(ev.marker().len(), 128);
    }

    #[test]
    fn erb_prefix_detected() {
        let ev = SeismEvent::new("erb_1", "12:00:00 01/01/2025", "-33", "-70", "10", "4.5").unwrap();
        assert!(ev.is_erb());
        let ev2 = SeismEvent::new("s1", "12:00:00 01/01/2025", "-33", "-70", "10", "4.5").unwrap();
        assert!(!ev2.is_erb());
    }
}
