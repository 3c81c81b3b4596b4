//! Battle format identifiers (`gen1ou`, `gen3uu`, ...)

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Competitive tier within a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Ubers,
    OU,
    UU,
    NU,
}

impl Tier {
    /// Get short label
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Ubers => "ubers",
            Tier::OU => "ou",
            Tier::UU => "uu",
            Tier::NU => "nu",
        }
    }
}

/// A battle format: one generation's ruleset restricted to one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BattleFormat {
    generation: u8,
    tier: Tier,
}

/// Formats trained on by default, one per early generation.
pub const TRAINING_FORMATS: [BattleFormat; 4] = [
    BattleFormat::new_const(1, Tier::OU),
    BattleFormat::new_const(2, Tier::OU),
    BattleFormat::new_const(3, Tier::OU),
    BattleFormat::new_const(4, Tier::OU),
];

/// Highest generation with a built-in dex.
pub const MAX_GENERATION: u8 = 4;

impl BattleFormat {
    const fn new_const(generation: u8, tier: Tier) -> Self {
        Self { generation, tier }
    }

    /// Create a format, rejecting generations without a built-in dex.
    pub fn new(generation: u8, tier: Tier) -> Result<Self> {
        if generation == 0 || generation > MAX_GENERATION {
            return Err(Error::InvalidBattleFormat {
                input: format!("gen{generation}{}", tier.label()),
                reason: format!("generation must be between 1 and {MAX_GENERATION}"),
            });
        }
        Ok(Self { generation, tier })
    }

    pub fn generation(&self) -> u8 {
        self.generation
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl fmt::Display for BattleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}{}", self.generation, self.tier.label())
    }
}

impl FromStr for BattleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let invalid = |reason: &str| Error::InvalidBattleFormat {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = lowered
            .strip_prefix("gen")
            .ok_or_else(|| invalid("expected a 'gen' prefix"))?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(invalid("missing generation number"));
        }
        let generation: u8 = digits
            .parse()
            .map_err(|_| invalid("generation number out of range"))?;
        let tier = match &rest[digits.len()..] {
            "ou" => Tier::OU,
            "uu" => Tier::UU,
            "nu" => Tier::NU,
            "ubers" => Tier::Ubers,
            other => {
                return Err(invalid(&format!(
                    "unknown tier '{other}' (expected ou, uu, nu, or ubers)"
                )));
            }
        };
        BattleFormat::new(generation, tier).map_err(|_| {
            invalid(&format!(
                "generation must be between 1 and {MAX_GENERATION}"
            ))
        })
    }
}

impl TryFrom<String> for BattleFormat {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BattleFormat> for String {
    fn from(format: BattleFormat) -> Self {
        format.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        for raw in ["gen1ou", "gen2uu", "gen3nu", "gen4ubers"] {
            let format: BattleFormat = raw.parse().unwrap();
            assert_eq!(format.to_string(), raw);
        }
        let upper: BattleFormat = "Gen3OU".parse().unwrap();
        assert_eq!(upper.generation(), 3);
        assert_eq!(upper.tier(), Tier::OU);
    }

    #[test]
    fn test_rejects_malformed_formats() {
        assert!("ou".parse::<BattleFormat>().is_err());
        assert!("genou".parse::<BattleFormat>().is_err());
        assert!("gen9ou".parse::<BattleFormat>().is_err());
        assert!("gen1vgc".parse::<BattleFormat>().is_err());
    }

    #[test]
    fn test_training_formats_cover_first_four_generations() {
        let labels: Vec<String> = TRAINING_FORMATS.iter().map(|f| f.to_string()).collect();
        assert_eq!(labels, ["gen1ou", "gen2ou", "gen3ou", "gen4ou"]);
    }
}
