use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for a requirement store.
///
/// Lives in a `config.toml` at the store root. Controls number formatting
/// and the receipt-bounds policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// The number of digits in the sequence component of requirement
    /// numbers.
    ///
    /// Sequences are padded to this width with leading zeros, e.g. `0001`
    /// (4 digits).
    pub(crate) digits: usize,

    /// Whether received quantities are bounded by assigned quantities.
    ///
    /// When `false` (the default, matching historical data), an assignment
    /// line may record more received than assigned; over-receipt stays
    /// available as a correction mechanism. When `true`, such a receipt is
    /// rejected.
    pub strict_receipts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            digits: default_digits(),
            strict_receipts: false,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or
    /// if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Returns the number of digits for padding sequence numbers.
    #[must_use]
    pub const fn digits(&self) -> usize {
        self.digits
    }
}

const fn default_digits() -> usize {
    4
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the
/// domain type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_digits")]
        digits: usize,

        #[serde(default)]
        strict_receipts: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                digits,
                strict_receipts,
            } => Self {
                digits,
                strict_receipts,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            digits: config.digits,
            strict_receipts: config.strict_receipts,
        }
    }
}
