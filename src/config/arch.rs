//! Size-tiered architecture presets

use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Architecture size tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchSize {
    Small,
    Medium,
    Large,
}

impl ArchSize {
    pub const ALL: [ArchSize; 3] = [ArchSize::Small, ArchSize::Medium, ArchSize::Large];

    pub fn name(&self) -> &'static str {
        match self {
            ArchSize::Small => "small",
            ArchSize::Medium => "medium",
            ArchSize::Large => "large",
        }
    }

    /// The preset document compiled into the binary for this tier.
    fn embedded(&self) -> &'static str {
        match self {
            ArchSize::Small => include_str!("../../configs/small.json"),
            ArchSize::Medium => include_str!("../../configs/medium.json"),
            ArchSize::Large => include_str!("../../configs/large.json"),
        }
    }
}

impl fmt::Display for ArchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ArchSize::Small),
            "medium" => Ok(ArchSize::Medium),
            "large" => Ok(ArchSize::Large),
            _ => Err(Error::UnknownArchSize {
                input: s.to_string(),
                expected: Self::ALL.map(|size| size.name()).join(", "),
            }),
        }
    }
}

/// Architecture hyperparameters for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchPreset {
    /// Hashed token feature buckets
    pub token_buckets: usize,
    /// Longest trajectory window fed to the learner
    pub max_seq_len: usize,
    pub learning_rate: f64,
    pub grad_clip: f64,
    /// Discount of the primary value head
    pub gamma: f64,
    /// Extra discounts for multi-gamma value heads
    pub multigammas: Vec<f64>,
}

impl ArchPreset {
    pub fn for_size(size: ArchSize) -> Result<Self> {
        Self::parse(size.embedded(), &format!("embedded {size} preset"))
    }

    /// Load a preset document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            operation: format!("read architecture preset {path:?}"),
            source,
        })?;
        Self::parse(&text, &format!("{path:?}"))
    }

    fn parse(text: &str, origin: &str) -> Result<Self> {
        let preset: ArchPreset =
            serde_json::from_str(text).map_err(|e| Error::SerializationContext {
                operation: format!("parse architecture preset {origin}"),
                message: e.to_string(),
            })?;
        preset.validate()?;
        Ok(preset)
    }

    fn validate(&self) -> Result<()> {
        if self.token_buckets == 0 || self.max_seq_len == 0 {
            return Err(Error::config("preset sizes must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.grad_clip > 0.0) {
            return Err(Error::config("learning_rate and grad_clip must be positive"));
        }
        let mut discounts = std::iter::once(&self.gamma).chain(&self.multigammas);
        if let Some(bad) = discounts.find(|g| !(0.0..1.0).contains(*g)) {
            return Err(Error::config(format!("discount {bad} outside [0, 1)")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_embedded_preset_parses() {
        for size in ArchSize::ALL {
            let preset = ArchPreset::for_size(size).unwrap();
            assert!(!preset.multigammas.is_empty(), "{size}");
        }
        let small = ArchPreset::for_size(ArchSize::Small).unwrap();
        let large = ArchPreset::for_size(ArchSize::Large).unwrap();
        assert!(small.token_buckets < large.token_buckets);
    }

    #[test]
    fn test_unknown_tier_lists_choices() {
        let err = "huge".parse::<ArchSize>().unwrap_err();
        assert!(err.to_string().contains("small, medium, large"));
    }

    #[test]
    fn test_preset_rejects_bad_discount() {
        let result = ArchPreset::parse(
            r#"{"token_buckets":8,"max_seq_len":8,"learning_rate":0.1,"grad_clip":1.0,"gamma":1.5,"multigammas":[]}"#,
            "inline",
        );
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
