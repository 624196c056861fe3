use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "SPENDING_TRACKER_OCR_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    pub endpoint: String,
    /// The `TEST` key is limited to a handful of calls per day.
    pub api_key: String,
    pub recognizer: String,
    pub ref_no: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://ocr.asprise.com/api/v1/receipt".to_string(),
            api_key: "TEST".to_string(),
            recognizer: "auto".to_string(),
            ref_no: "spending_tracker".to_string(),
            timeout_secs: default_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_backoff_secs() -> u64 {
    10
}

/// Who pays for a purchase line by default, and what share the debtor owes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostShare {
    pub creditor: i64,
    pub debtor: i64,
    pub debt_multiplier: f64,
}

impl Default for CostShare {
    fn default() -> Self {
        Self {
            creditor: 2,
            debtor: 1,
            debt_multiplier: 0.4,
        }
    }
}

impl CostShare {
    pub fn validate(&self) -> Result<()> {
        if !self.debt_multiplier.is_finite() || !(0.0..=1.0).contains(&self.debt_multiplier) {
            return Err(Error::Config(format!(
                "debt_multiplier must be within 0..=1, got {}",
                self.debt_multiplier
            )));
        }
        if self.creditor == self.debtor {
            return Err(Error::Config(format!(
                "default creditor and debtor are both participant {}",
                self.creditor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSeed {
    pub name: String,
    pub email: Option<String>,
}

fn default_participants() -> Vec<ParticipantSeed> {
    vec![
        ParticipantSeed {
            name: "Me".to_string(),
            email: None,
        },
        ParticipantSeed {
            name: "Friend".to_string(),
            email: None,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ocr: OcrSettings,
    #[serde(default)]
    pub sharing: CostShare,
    #[serde(default = "default_participants")]
    pub participants: Vec<ParticipantSeed>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr: OcrSettings::default(),
            sharing: CostShare::default(),
            participants: default_participants(),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file, falling back to defaults when no file is given.
    /// The OCR api key can be overridden from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str::<Settings>(&raw)?
            }
            None => Settings::default(),
        };
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                settings.ocr.api_key = key;
            }
        }
        settings.sharing.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub db_path: PathBuf,
    pub results_dir: PathBuf,
}

impl AppPaths {
    pub fn discover(root: &Path) -> Result<Self> {
        let results_dir = root.join("json");
        std::fs::create_dir_all(&results_dir)?;

        Ok(Self {
            db_path: root.join("spending_tracker.db"),
            results_dir,
        })
    }

    /// Resolves a stored OCR response. Bare file names live in the results directory.
    pub fn resolve_result(&self, name: &Path) -> PathBuf {
        if name.is_absolute() || name.parent().map_or(false, |p| !p.as_os_str().is_empty()) {
            name.to_path_buf()
        } else {
            self.results_dir.join(name)
        }
    }
}
