//! MPEG-1/2 Layer III frame header parsing.
//!
//! Parses the 4-byte frame header bit-exactly as the radio beacon source
//! does, then tracks the frame body so its canonical form and marker can
//! be computed. Reading the bytes off the wire is the collector's job
//! (`sources::radio`); this module is the pure byte-to-struct half.

use sha3::{Digest, Sha3_512};
use thiserror::Error;

/// MPEG audio version carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
}

const MPEG1_SAMPLERATE: [u32; 3] = [44_100, 48_000, 32_000];
const MPEG2_SAMPLERATE: [u32; 3] = [22_050, 12_000, 16_000];

const MPEG1_BITRATE: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const MPEG2_BITRATE: [u32; 15] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160,
];

/// Errors raised while parsing a single frame header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameParseError {
    #[error("invalid sync byte: expected 0xff, got {0:#04x}")]
    InvalidSyncByte(u8),
    #[error("invalid sync nibble: expected top nibble 0xf, got {0:#04x}")]
    InvalidSyncNibble(u8),
    #[error("frame layer is not Layer III")]
    NonLayer3,
    #[error("invalid bitrate index {0:#04x}")]
    InvalidBitrate(u8),
    #[error("invalid samplerate index 0x03")]
    InvalidSampleRate,
}

/// A parsed MPEG frame header plus the raw 4 bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub crc: bool,
    pub bitrate_kbps: u32,
    pub samplerate_hz: u32,
    pub padding: bool,
    /// The exact 4 header bytes, including the nominally "ignored" 4th byte
    /// (see SPEC_FULL §5.7 — it still counts toward the canonical form).
    pub raw: [u8; 4],
}

impl FrameHeader {
    /// Parse a 4-byte MPEG frame header.
    ///
    /// # Errors
    /// Returns a [`FrameParseError`] if any header field is out of spec.
    pub fn parse(raw: [u8; 4]) -> Result<Self, FrameParseError> {
        if raw[0] != 0xff {
            return Err(FrameParseError::InvalidSyncByte(raw[0]));
        }
        if (raw[1] & 0xf0) != 0xf0 {
            return Err(FrameParseError::InvalidSyncNibble(raw[1]));
        }
        let version = if (raw[1] & 0x08) >> 3 == 1 {
            MpegVersion::Mpeg1
        } else {
            MpegVersion::Mpeg2
        };
        if (raw[1] & 0x06) >> 1 != 0x01 {
            return Err(FrameParseError::NonLayer3);
        }
        let crc = (raw[1] & 0x01) == 0x01;

        let bitrate_index = raw[2] >> 4;
        if bitrate_index == 0x00 || bitrate_index == 0x0f {
            return Err(FrameParseError::InvalidBitrate(bitrate_index));
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => MPEG1_BITRATE[bitrate_index as usize],
            MpegVersion::Mpeg2 => MPEG2_BITRATE[bitrate_index as usize],
        };

        let samplerate_index = (raw[2] & 0x0c) >> 2;
        if samplerate_index == 0x03 {
            return Err(FrameParseError::InvalidSampleRate);
        }
        let samplerate_hz = match version {
            MpegVersion::Mpeg1 => MPEG1_SAMPLERATE[samplerate_index as usize],
            MpegVersion::Mpeg2 => MPEG2_SAMPLERATE[samplerate_index as usize],
        };

        let padding = (raw[2] & 0x02) >> 1 == 1;

        Ok(Self {
            version,
            crc,
            bitrate_kbps,
            samplerate_hz,
            padding,
            raw,
        })
    }

    /// Body length in bytes, per spec.md §4.3.
    #[must_use]
    pub fn body_len(&self) -> usize {
        let mut len = 144_000 * self.bitrate_kbps as i64 / self.samplerate_hz as i64 - 4;
        if self.padding {
            len += 1;
        }
        len.max(0) as usize
    }
}

/// A complete MPEG frame: header plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    pub header: FrameHeader,
    pub body: Vec<u8>,
}

impl RadioFrame {
    #[must_use]
    pub fn new(header: FrameHeader, body: Vec<u8>) -> Self {
        Self { header, body }
    }

    /// 4 header bytes concatenated with the body — the bytes compared
    /// against the beacon's declared raw value.
    #[must_use]
    pub fn canonical_form(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        out.extend_from_slice(&self.header.raw);
        out.extend_from_slice(&self.body);
        out
    }

    /// SHA3-512 hex digest of the canonical form.
    #[must_use]
    pub fn marker(&self) -> String {
        hex::encode(Sha3_512::digest(self.canonical_form()))
    }
}
