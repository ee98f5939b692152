//! Radio source: collects MP3 frames from an Icecast-style stream over
//! a raw TCP connection and verifies a pulse's claimed frame sequence
//! against the buffered frames.
//!
//! Grounded on `original_source/verifier/radio/source.py`: the
//! collector opens a bare HTTP/1.0 GET and discards headers up to the
//! blank line, then reads frames back-to-back forever; `verify` checks
//! the ext-value-status bit first, then the marker's lexicographic
//! prefix bound, then waits for enough buffered frames to reconstruct
//! the beacon's claimed window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use verifier_core::radio_frame::FrameHeader;
use verifier_core::{RadioBuffer, RadioFrame, Source, VerifierResult, VerifyParams};

/// Buffer holds roughly 5 seconds of 256kbps audio (spec.md §4.3).
const BUFFER_SIZE: usize = 26 * 1000 * 2 * 5;
/// Number of consecutive frames a pulse's claimed window spans.
const FRAMES_NUM: usize = 300;
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(5);
const FRAMES_WAIT_POLL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub url: String,
    pub port: u16,
    pub prefix: String,
}

pub struct RadioSource {
    config: RadioConfig,
    buffer: RadioBuffer,
    stream: Option<BufReader<TcpStream>>,
}

impl RadioSource {
    #[must_use]
    pub fn new(config: RadioConfig) -> Self {
        let prefix = config.prefix.clone();
        Self {
            config,
            buffer: RadioBuffer::new(BUFFER_SIZE, prefix),
            stream: None,
        }
    }

    async fn read_frame(stream: &mut BufReader<TcpStream>) -> anyhow::Result<RadioFrame> {
        let mut raw = [0u8; 4];
        tokio::time::timeout(FRAME_READ_TIMEOUT, stream.read_exact(&mut raw)).await??;
        let header = FrameHeader::parse(raw)?;
        let mut body = vec![0u8; header.body_len()];
        tokio::time::timeout(FRAME_READ_TIMEOUT, stream.read_exact(&mut body)).await??;
        Ok(RadioFrame::new(header, body))
    }
}

#[async_trait]
impl Source for RadioSource {
    fn name(&self) -> &str {
        "radio"
    }

    async fn init_collector(&mut self) -> anyhow::Result<()> {
        let tcp = TcpStream::connect((self.config.url.as_str(), self.config.port)).await?;
        let mut stream = BufReader::new(tcp);
        stream.get_mut().write_all(b"GET /; HTTP/1.0\r\n\r\n").await?;
        // discard the response headers up to the blank line
        loop {
            let mut line = String::new();
            let n = tokio::io::AsyncBufReadExt::read_line(&mut stream, &mut line).await?;
            if n == 0 || line.trim().is_empty() {
                break;
            }
        }
        self.stream = Some(stream);
        Ok(())
    }

    async fn collect(&mut self) -> anyhow::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("radio collector not initialized"))?;
        let frame = Self::read_frame(stream).await?;
        self.buffer.add(frame);
        Ok(())
    }

    async fn finish_collector(&mut self) -> anyhow::Result<()> {
        self.stream = None;
        Ok(())
    }

    async fn verify(&mut self, params: &VerifyParams) -> VerifierResult {
        let mut result = VerifierResult::new(self.name(), Utc::now());
        result.possible = self.buffer.possible();
        result.ext_value_status = params.status;
        if params.status & 0b10 == 0b10 {
            result.status = verifier_core::VerifierStatus::WrongStatusCode;
            result.add_detail(format!("ExtValue is not valid, beacon_status={}", params.status));
            result.finish(Utc::now());
            return result;
        }

        let limit = {
            let mut l = self.config.prefix.clone();
            l.extend(std::iter::repeat('f').take(params.metadata.len().saturating_sub(l.len())));
            l
        };
        if params.metadata > limit {
            result.status = verifier_core::VerifierStatus::InvalidExtractionParameters;
            result.add_detail(format!(
                "wrong marker in pulse metadata, limit={limit}, metadata={}",
                params.metadata
            ));
            result.finish(Utc::now());
            return result;
        }

        if self.buffer.check_marker(&params.metadata) {
            while self.buffer.len() < FRAMES_NUM {
                tokio::time::sleep(FRAMES_WAIT_POLL).await;
            }
            let frames = self.buffer.get_list(FRAMES_NUM);
            let mut joined = Vec::new();
            for frame in &frames {
                joined.extend_from_slice(&frame.canonical_form());
            }
            let ours = hex::encode(&joined);
            if ours != params.raw {
                result.status = verifier_core::VerifierStatus::DataDoesNotMatchBuffer;
                result.add_detail(format!("raw value does not match, ours={ours}, theirs={}", params.raw));
            }
        } else {
            result.status = verifier_core::VerifierStatus::DataNotFoundInBuffer;
            result.add_detail(format!(
                "metadata not found, metadata={}, buffer_size={}",
                params.metadata,
                self.buffer.len()
            ));
        }
        result.finish(Utc::now());
        result
    }

    fn possible(&self) -> usize {
        self.buffer.possible()
    }

    fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RadioConfig {
        RadioConfig {
            url: "127.0.0.1".into(),
            port: 8000,
            prefix: "00".into(),
        }
    }

    #[tokio::test]
    async fn wrong_status_bit_short_circuits() {
        let mut source = RadioSource::new(config());
        let params = VerifyParams {
            metadata: "00aabb".into(),
            raw: String::new(),
            status: 0b10,
        };
        let result = source.verify(&params).await;
        assert_eq!(result.status, verifier_core::VerifierStatus::WrongStatusCode);
    }

    #[tokio::test]
    async fn metadata_past_prefix_limit_is_rejected() {
        let mut source = RadioSource::new(config());
        let params = VerifyParams {
            metadata: "ffaabb".into(),
            raw: String::new(),
            status: 0,
        };
        let result = source.verify(&params).await;
        assert_eq!(
            result.status,
            verifier_core::VerifierStatus::InvalidExtractionParameters
        );
    }

    #[tokio::test]
    async fn metadata_not_buffered_is_reported() {
        let mut source = RadioSource::new(config());
        let params = VerifyParams {
            metadata: "00aabb".into(),
            raw: String::new(),
            status: 0,
        };
        let result = source.verify(&params).await;
        assert_eq!(result.status, verifier_core::VerifierStatus::DataNotFoundInBuffer);
    }
}
