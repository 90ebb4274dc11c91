use std::path::PathBuf;
use std::time::Duration;

use crate::credential::{DEFAULT_CREDENTIAL_MINUTES, MAX_CREDENTIAL_MINUTES};

/// Default per-item evidence ceiling (15 MiB).
pub const DEFAULT_MAX_EVIDENCE_BYTES: usize = 15 * 1024 * 1024;

/// Default bound on a single storage call.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Settings for the lifecycle engine and the evidence ledger.
///
/// Built once at process start and handed to each component's constructor.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Directory the local blob store writes evidence into.
    pub upload_dir: PathBuf,
    /// Per-item byte ceiling for evidence uploads.
    pub max_evidence_bytes: usize,
    /// Validity used when the caller does not ask for a duration.
    pub default_credential_minutes: i64,
    /// Operator ceiling for credential validity. Never above seven days.
    pub max_credential_minutes: i64,
    /// Upper bound on any single storage call.
    pub store_timeout: Duration,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_evidence_bytes: DEFAULT_MAX_EVIDENCE_BYTES,
            default_credential_minutes: DEFAULT_CREDENTIAL_MINUTES,
            max_credential_minutes: MAX_CREDENTIAL_MINUTES,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

impl AccessConfig {
    /// Load from environment variables with defaults.
    ///
    /// | Env Var                      | Default    |
    /// |------------------------------|------------|
    /// | `UPLOAD_DIR`                 | `uploads`  |
    /// | `MAX_EVIDENCE_BYTES`         | `15728640` |
    /// | `DEFAULT_CREDENTIAL_MINUTES` | `60`       |
    /// | `MAX_CREDENTIAL_MINUTES`     | `10080`    |
    /// | `STORE_TIMEOUT_SECS`         | `10`       |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        let max_evidence_bytes: usize = std::env::var("MAX_EVIDENCE_BYTES")
            .map(|v| v.parse().expect("MAX_EVIDENCE_BYTES must be a valid usize"))
            .unwrap_or(defaults.max_evidence_bytes);

        let default_credential_minutes: i64 = std::env::var("DEFAULT_CREDENTIAL_MINUTES")
            .map(|v| {
                v.parse()
                    .expect("DEFAULT_CREDENTIAL_MINUTES must be a valid i64")
            })
            .unwrap_or(defaults.default_credential_minutes);

        let max_credential_minutes: i64 = std::env::var("MAX_CREDENTIAL_MINUTES")
            .map(|v| v.parse().expect("MAX_CREDENTIAL_MINUTES must be a valid i64"))
            .unwrap_or(defaults.max_credential_minutes)
            .clamp(1, MAX_CREDENTIAL_MINUTES);

        let store_timeout = std::env::var("STORE_TIMEOUT_SECS")
            .map(|v| {
                Duration::from_secs(v.parse().expect("STORE_TIMEOUT_SECS must be a valid u64"))
            })
            .unwrap_or(defaults.store_timeout);

        Self {
            upload_dir,
            max_evidence_bytes,
            default_credential_minutes,
            max_credential_minutes,
            store_timeout,
        }
    }

    /// Credential ceiling actually enforced: the operator value, capped at
    /// seven days.
    pub fn credential_ceiling(&self) -> i64 {
        self.max_credential_minutes.clamp(1, MAX_CREDENTIAL_MINUTES)
    }
}
