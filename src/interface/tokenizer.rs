//! Named token vocabularies for text observations

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Padding token id
pub const PAD_TOKEN: u32 = 0;
/// Token id for empty words
pub const UNKNOWN_TOKEN: u32 = 1;
const RESERVED_TOKENS: u32 = 2;

/// Identity of a versioned token vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenizerId {
    AllReplaysV1,
    AllReplaysV2,
    AllReplaysV3,
    DefaultObservationSpaceV0,
}

impl TokenizerId {
    pub const ALL: [TokenizerId; 4] = [
        TokenizerId::AllReplaysV1,
        TokenizerId::AllReplaysV2,
        TokenizerId::AllReplaysV3,
        TokenizerId::DefaultObservationSpaceV0,
    ];

    /// Get the published vocabulary name
    pub fn name(&self) -> &'static str {
        match self {
            TokenizerId::AllReplaysV1 => "allreplays-v1",
            TokenizerId::AllReplaysV2 => "allreplays-v2",
            TokenizerId::AllReplaysV3 => "allreplays-v3",
            TokenizerId::DefaultObservationSpaceV0 => "DefaultObservationSpace-v0",
        }
    }

    /// Number of token ids including reserved ids
    pub fn vocab_size(&self) -> u32 {
        match self {
            TokenizerId::AllReplaysV1 => 4_096,
            TokenizerId::AllReplaysV2 => 6_144,
            TokenizerId::AllReplaysV3 => 8_192,
            TokenizerId::DefaultObservationSpaceV0 => 2_048,
        }
    }
}

impl Default for TokenizerId {
    fn default() -> Self {
        TokenizerId::AllReplaysV3
    }
}

impl fmt::Display for TokenizerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TokenizerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TokenizerId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownTokenizer {
                input: s.to_string(),
                expected: TokenizerId::ALL.map(|id| id.name()).join(", "),
            })
    }
}

/// Maps words to stable token ids within one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    id: TokenizerId,
}

impl Tokenizer {
    pub fn new(id: TokenizerId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> TokenizerId {
        self.id
    }

    /// Token id for one word. Case-insensitive and stable across runs.
    pub fn token(&self, word: &str) -> u32 {
        let word = word.trim();
        if word.is_empty() {
            return UNKNOWN_TOKEN;
        }
        let mut hasher = FxHasher::default();
        self.id.name().hash(&mut hasher);
        word.to_ascii_lowercase().hash(&mut hasher);
        let span = u64::from(self.id.vocab_size() - RESERVED_TOKENS);
        RESERVED_TOKENS + (hasher.finish() % span) as u32
    }

    pub fn tokenize<S: AsRef<str>>(&self, words: &[S]) -> Vec<u32> {
        words.iter().map(|word| self.token(word.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown_names() {
        assert_eq!(
            "allreplays-v3".parse::<TokenizerId>().unwrap(),
            TokenizerId::AllReplaysV3
        );
        let err = "allreplays-v9".parse::<TokenizerId>().unwrap_err();
        assert!(matches!(err, Error::UnknownTokenizer { .. }));
    }

    #[test]
    fn test_tokens_are_stable_and_in_range() {
        let tokenizer = Tokenizer::new(TokenizerId::AllReplaysV1);
        let a = tokenizer.token("Tauros");
        assert_eq!(a, tokenizer.token("tauros"));
        assert!(a >= RESERVED_TOKENS && a < TokenizerId::AllReplaysV1.vocab_size());
        assert_eq!(tokenizer.token("  "), UNKNOWN_TOKEN);
    }
}
