//! Persists one verification cycle's report to disk, per spec.md §6's
//! output layout and JSON schema.

use std::path::PathBuf;

use chrono::Utc;
use verifier_core::{PulseResult, VerifierResult};

/// Writes verification reports under a configured root folder.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes `{root}/chain/{chainId}/pulse/{pulseId}.json` and
    /// overwrites `{root}/last.json` with the same report.
    ///
    /// # Errors
    /// Returns an error if the report directories cannot be created or
    /// the files cannot be written.
    pub fn save(&self, pulse: &PulseResult, sources: &[VerifierResult]) -> anyhow::Result<()> {
        let report = build_report(pulse, sources);
        let body = serde_json::to_vec_pretty(&report)?;

        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.root.join("last.json"), &body)?;

        if let (Some(chain), Some(id)) = (pulse.chain_id(), pulse.pulse_id()) {
            let dir = self.root.join("chain").join(chain.to_string()).join("pulse");
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(format!("{id}.json")), &body)?;
        }
        Ok(())
    }
}

fn build_report(pulse: &PulseResult, sources: &[VerifierResult]) -> serde_json::Value {
    let mut by_source = serde_json::Map::new();
    for result in sources {
        by_source.insert(result.scope.clone(), result.to_json());
    }
    serde_json::json!({
        "checked_date": Utc::now().to_rfc3339(),
        "pulse": pulse.to_json(),
        "sources": by_source,
    })
}
