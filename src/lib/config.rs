use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

use crate::domain::{
    merkle::{
        DEFAULT_MERKLE_TREE_HEIGHT,
        DEFAULT_ROOT_HISTORY_SIZE,
    },
    utxo::{
        LookupTables,
        NATIVE_ASSET,
    },
    verifier::VerifierConfig,
};

/// Engine configuration loaded from TOML. Every section is optional and
/// falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub accumulator: AccumulatorConfig,
    pub prover: ProverConfig,
    pub lookup_tables: LookupTables,
    pub verifier: VerifierConfig,
}

/// Where the pool lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub program_id: B256,
    pub merkle_tree_id: B256,
    /// Deadline for a single ledger read (e.g. "10s").
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            program_id: B256::ZERO,
            merkle_tree_id: B256::ZERO,
            fetch_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for transient ledger failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    pub height: usize,
    pub root_history_size: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_MERKLE_TREE_HEIGHT,
            root_history_size: DEFAULT_ROOT_HISTORY_SIZE,
        }
    }
}

/// External snarkjs prover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    pub snarkjs_bin: String,
    pub wasm_path: PathBuf,
    pub zkey_path: PathBuf,
    pub vkey_path: PathBuf,
    /// Directory for input.json, proof.json and public.json.
    pub working_dir: PathBuf,
    /// Deadline for one proof generation (e.g. "2m").
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            snarkjs_bin: "snarkjs".to_string(),
            wasm_path: PathBuf::from("circuits/transaction.wasm"),
            zkey_path: PathBuf::from("circuits/transaction.zkey"),
            vkey_path: PathBuf::from("circuits/verification_key.json"),
            working_dir: std::env::temp_dir().join("shielded-tx-engine"),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let height = self.accumulator.height;
        if height == 0 || height > 32 {
            return Err(ConfigError::Validation(format!(
                "accumulator.height must be within 1..=32, got {height}"
            )));
        }
        if self.accumulator.root_history_size == 0 {
            return Err(ConfigError::Validation(
                "accumulator.root_history_size must be non-zero".into(),
            ));
        }
        if self.ledger.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "ledger.retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.ledger.fetch_timeout.is_zero() || self.prover.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "ledger.fetch_timeout and prover.timeout must be non-zero".into(),
            ));
        }
        if self.lookup_tables.assets.first() != Some(&NATIVE_ASSET) {
            return Err(ConfigError::Validation(
                "lookup_tables.assets must start with the native asset".into(),
            ));
        }

        let (in_arity, out_arity) = (self.verifier.in_arity(), self.verifier.out_arity());
        if in_arity == 0 || out_arity == 0 || out_arity % 2 != 0 {
            return Err(ConfigError::Validation(format!(
                "verifier arity {in_arity}x{out_arity} invalid: both non-zero, outputs even"
            )));
        }

        Ok(())
    }
}
