//! Integration tests for the verifier workspace.
//!
//! Exercises the fan-out/timeout behaviour described in spec.md §4.7
//! directly against `verifier_core::Source`, without needing a running
//! beacon or a live manager: a fake source that sleeps past the
//! deadline stands in for a source whose network call hangs, and the
//! test asserts that a `tokio::time::timeout`-wrapped fan-out
//! synthesizes a 250 (timeout) result exactly as the manager does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use verifier_core::{PulseStatus, Source, VerifierResult, VerifierStatus, VerifyParams};

struct SlowSource {
    delay: Duration,
    buffer_len: usize,
}

#[async_trait]
impl Source for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn init_collector(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn collect(&mut self) -> anyhow::Result<()> {
        self.buffer_len += 1;
        Ok(())
    }

    async fn finish_collector(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn verify(&mut self, _params: &VerifyParams) -> VerifierResult {
        tokio::time::sleep(self.delay).await;
        let mut result = VerifierResult::new(self.name(), Utc::now());
        result.status = VerifierStatus::Ok;
        result.finish(Utc::now());
        result
    }

    fn possible(&self) -> usize {
        0
    }

    fn buffer_len(&self) -> usize {
        self.buffer_len
    }
}

async fn verify_with_deadline(
    source: &Arc<Mutex<dyn Source>>,
    params: &VerifyParams,
    deadline: Duration,
) -> VerifierResult {
    let source = Arc::clone(source);
    let params = params.clone();
    let attempt = async move {
        let mut guard = source.lock().await;
        guard.verify(&params).await
    };
    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => {
            let mut result = VerifierResult::new("slow", Utc::now());
            result.status = VerifierStatus::Timeout;
            result.add_detail("verification task exceeded the fan-out deadline");
            result.finish(Utc::now());
            result
        }
    }
}

#[tokio::test(start_paused = true)]
async fn slow_verify_synthesizes_timeout_result() {
    let source: Arc<Mutex<dyn Source>> = Arc::new(Mutex::new(SlowSource {
        delay: Duration::from_secs(30),
        buffer_len: 0,
    }));
    let params = VerifyParams {
        metadata: String::new(),
        raw: String::new(),
        status: 0,
    };

    let handle = tokio::spawn({
        let source = Arc::clone(&source);
        let params = params.clone();
        async move { verify_with_deadline(&source, &params, Duration::from_secs(5)).await }
    });

    tokio::time::advance(Duration::from_secs(6)).await;
    let result = handle.await.unwrap();

    assert_eq!(result.status, VerifierStatus::Timeout);
    assert_eq!(result.status.code(), 250);
    assert!(!result.valid());
}

#[tokio::test(start_paused = true)]
async fn fast_verify_completes_before_deadline() {
    let source: Arc<Mutex<dyn Source>> = Arc::new(Mutex::new(SlowSource {
        delay: Duration::from_millis(10),
        buffer_len: 0,
    }));
    let params = VerifyParams {
        metadata: String::new(),
        raw: String::new(),
        status: 0,
    };

    let handle = tokio::spawn({
        let source = Arc::clone(&source);
        let params = params.clone();
        async move { verify_with_deadline(&source, &params, Duration::from_secs(5)).await }
    });

    tokio::time::advance(Duration::from_millis(20)).await;
    let result = handle.await.unwrap();

    assert_eq!(result.status, VerifierStatus::Ok);
    assert!(result.valid());
}

#[test]
fn pulse_status_code_taxonomy_matches_spec() {
    assert_eq!(PulseStatus::Ok.code(), 100);
    assert_eq!(PulseStatus::ExtractionUnsuccessful.code(), 110);
    assert_eq!(PulseStatus::BeaconValueInvalid.code(), 120);
    assert_eq!(PulseStatus::Timeout.code(), 130);
    assert_eq!(PulseStatus::Unknown.code(), 199);
}

#[test]
fn verifier_status_code_taxonomy_matches_spec() {
    assert_eq!(VerifierStatus::Ok.code(), 200);
    assert_eq!(VerifierStatus::EmptyMetadata.code(), 210);
    assert_eq!(VerifierStatus::EmptyRawData.code(), 211);
    assert_eq!(VerifierStatus::InvalidExtractionParameters.code(), 220);
    assert_eq!(VerifierStatus::DataDoesNotMatchBuffer.code(), 221);
    assert_eq!(VerifierStatus::DataNotFoundInBuffer.code(), 222);
    assert_eq!(VerifierStatus::SeismValueMismatch.code(), 230);
    assert_eq!(VerifierStatus::SeismMetadataNotFound.code(), 231);
    assert_eq!(VerifierStatus::WrongStatusCode.code(), 240);
    assert_eq!(VerifierStatus::Timeout.code(), 250);
    assert_eq!(VerifierStatus::Unknown.code(), 299);
}
