use std::path::{
    Path,
    PathBuf,
};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{
    debug,
    info,
};

use crate::{
    config::ProverConfig,
    domain::proof::{
        ProofInputs,
        ProverProof,
        RawProof,
    },
    ports::prover::{
        Prover,
        ProverError,
    },
};

const INPUT_FILE: &str = "input.json";
const PROOF_FILE: &str = "proof.json";
const PUBLIC_FILE: &str = "public.json";

/// SnarkjsProver generates Groth16 proofs by shelling out to the snarkjs CLI.
///
/// This prover:
/// 1. Writes the circuit inputs to `input.json` in a fresh scratch directory
/// 2. Runs `snarkjs groth16 fullprove` to compute the witness and the proof
/// 3. Reads `proof.json` and `public.json` back
///
/// Verification writes both files again and runs `snarkjs groth16 verify`.
/// Each call gets its own scratch directory under the working directory,
/// removed when the call returns, so concurrent calls never share files.
pub struct SnarkjsProver {
    snarkjs_bin: String,
    wasm_path: PathBuf,
    zkey_path: PathBuf,
    vkey_path: PathBuf,
    working_dir: PathBuf,
}

impl SnarkjsProver {
    pub fn new(config: &ProverConfig) -> Self {
        Self {
            snarkjs_bin: config.snarkjs_bin.clone(),
            wasm_path: config.wasm_path.clone(),
            zkey_path: config.zkey_path.clone(),
            vkey_path: config.vkey_path.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    async fn scratch_dir(&self) -> Result<TempDir, ProverError> {
        tokio::fs::create_dir_all(&self.working_dir).await?;
        let dir = tempfile::Builder::new()
            .prefix("snarkjs-")
            .tempdir_in(&self.working_dir)?;
        Ok(dir)
    }

    async fn ensure_artifact(path: &Path) -> Result<(), ProverError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(ProverError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("circuit artifact not found: {}", path.display()),
            )));
        }
        Ok(())
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ProverError> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProverError> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ProverError::SerializationError(format!("{}: {e}", path.display()))
        })
    }
}

impl Prover for SnarkjsProver {
    async fn prove(&self, inputs: &ProofInputs) -> Result<RawProof, ProverError> {
        Self::ensure_artifact(&self.wasm_path).await?;
        Self::ensure_artifact(&self.zkey_path).await?;
        let scratch = self.scratch_dir().await?;
        let proof_path = scratch.path().join(PROOF_FILE);
        let public_path = scratch.path().join(PUBLIC_FILE);

        // 1. Write input.json
        let input_path = scratch.path().join(INPUT_FILE);
        Self::write_json(&input_path, inputs).await?;

        // 2. Run snarkjs groth16 fullprove
        debug!(scratch = %scratch.path().display(), "Running snarkjs groth16 fullprove");
        let output = Command::new(&self.snarkjs_bin)
            .arg("groth16")
            .arg("fullprove")
            .arg(&input_path)
            .arg(&self.wasm_path)
            .arg(&self.zkey_path)
            .arg(&proof_path)
            .arg(&public_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProverError::ProofGenerationError(format!(
                "snarkjs groth16 fullprove failed: {}",
                stderr
            )));
        }

        // 3. Read proof.json and public.json
        let proof: ProverProof = Self::read_json(&proof_path).await?;
        let public_signals: Vec<String> = Self::read_json(&public_path).await?;
        info!(public_signals = public_signals.len(), "snarkjs proof generated");

        Ok(RawProof {
            proof,
            public_signals,
        })
    }

    async fn verify(&self, proof: &RawProof) -> Result<bool, ProverError> {
        Self::ensure_artifact(&self.vkey_path).await?;
        let scratch = self.scratch_dir().await?;
        let proof_path = scratch.path().join(PROOF_FILE);
        let public_path = scratch.path().join(PUBLIC_FILE);
        Self::write_json(&proof_path, &proof.proof).await?;
        Self::write_json(&public_path, &proof.public_signals).await?;

        let output = Command::new(&self.snarkjs_bin)
            .arg("groth16")
            .arg("verify")
            .arg(&self.vkey_path)
            .arg(&public_path)
            .arg(&proof_path)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.contains("OK") {
            return Ok(true);
        }
        if stdout.contains("Invalid proof") {
            return Ok(false);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ProverError::VerificationError(format!(
            "snarkjs groth16 verify failed: {}{}",
            stdout, stderr
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> ProverConfig {
        ProverConfig {
            snarkjs_bin: "snarkjs".to_string(),
            wasm_path: dir.join("missing.wasm"),
            zkey_path: dir.join("missing.zkey"),
            vkey_path: dir.join("missing_vkey.json"),
            working_dir: dir.join("work"),
            timeout: std::time::Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_missing_artifacts_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let prover = SnarkjsProver::new(&config(dir.path()));
        let raw = RawProof {
            proof: ProverProof {
                pi_a: vec![],
                pi_b: vec![],
                pi_c: vec![],
                protocol: None,
                curve: None,
            },
            public_signals: vec![],
        };
        assert!(matches!(
            prover.verify(&raw).await,
            Err(ProverError::IoError(_))
        ));
    }

    #[tokio::test]
    async fn test_scratch_dirs_are_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let prover = SnarkjsProver::new(&config);

        let (first, second) = tokio::join!(prover.scratch_dir(), prover.scratch_dir());
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(&config.working_dir));
        assert!(second.path().starts_with(&config.working_dir));

        let kept = first.path().to_path_buf();
        drop(first);
        assert!(!kept.exists());
        assert!(second.path().exists());
    }

    #[tokio::test]
    async fn test_json_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PUBLIC_FILE);
        let signals = vec!["1".to_string(), "2".to_string()];
        SnarkjsProver::write_json(&path, &signals).await.unwrap();
        let read: Vec<String> = SnarkjsProver::read_json(&path).await.unwrap();
        assert_eq!(read, signals);
    }
}
