use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::assembler::CompiledPipeline;
use crate::builder::PipelineBuilder;
use crate::capabilities::{AccelPolicy, HardwareCapabilities};
use crate::request::TranscodeRequest;

/// Fingerprint of a compiled request, for detecting drift between runs.
#[derive(Debug, Serialize)]
pub struct PipelineLock {
    pub request_version: u32,
    pub generated_at: DateTime<Utc>,
    pub kind: String,
    pub policy: AccelPolicy,
    pub capabilities_hash: String,
    pub steps: Vec<StepLock>,
    pub environment_hash: String,
    pub arguments_hash: String,
}

#[derive(Debug, Serialize)]
pub struct StepLock {
    pub position: usize,
    pub name: String,
}

pub fn generate_lock(
    request: &TranscodeRequest,
    base_dir: &Path,
    policy: AccelPolicy,
    path: &Path,
) -> Result<PipelineLock> {
    let capabilities = request.load_capabilities(base_dir)?;
    let builder = PipelineBuilder::new(capabilities.clone());
    let compiled = request
        .compile(&builder, policy)
        .context("Failed to compile request")?;

    let lock = lock_for(request, policy, &capabilities, &compiled);

    let file = File::create(path)
        .with_context(|| format!("Failed to create lockfile: {}", path.display()))?;
    serde_yaml::to_writer(file, &lock)
        .with_context(|| format!("Failed to write lockfile: {}", path.display()))?;

    Ok(lock)
}

pub fn lock_for(
    request: &TranscodeRequest,
    policy: AccelPolicy,
    capabilities: &HardwareCapabilities,
    compiled: &CompiledPipeline,
) -> PipelineLock {
    PipelineLock {
        request_version: request.version,
        generated_at: Utc::now(),
        kind: request.job.kind().to_string(),
        policy,
        capabilities_hash: hash_json(capabilities),
        steps: compiled
            .steps
            .iter()
            .enumerate()
            .map(|(position, name)| StepLock {
                position,
                name: name.clone(),
            })
            .collect(),
        environment_hash: hash_words(
            compiled
                .environment
                .iter()
                .map(|var| format!("{}={}", var.key, var.value)),
        ),
        arguments_hash: hash_words(compiled.arguments()),
    }
}

fn hash_json<T: Serialize>(value: &T) -> String {
    let serialized = serde_json::to_vec(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    format!("{:x}", hasher.finalize())
}

fn hash_words(words: impl IntoIterator<Item = String>) -> String {
    let mut hasher = Sha256::new();
    for word in words {
        hasher.update(word.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_hash_separates_words() {
        let joined = hash_words(["-c:v".to_string(), "copy".to_string()]);
        let merged = hash_words(["-c:vcopy".to_string()]);
        assert_ne!(joined, merged);
        assert_eq!(joined.len(), 64);
    }
}
