//! Objective weighting derived from the training mode

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Scale applied to environment rewards before value learning
pub const REWARD_MULTIPLIER: f64 = 10.0;

/// Target-network smoothing factor
pub const TAU: f64 = 0.004;

/// Advantage filter used by filtered behaviour cloning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterFunc {
    /// Accept an action iff its advantage is positive
    #[default]
    Binary,
    /// Weight an action by `exp(advantage)`, clipped
    Exp,
}

impl FilterFunc {
    pub fn name(&self) -> &'static str {
        match self {
            FilterFunc::Binary => "binary",
            FilterFunc::Exp => "exp",
        }
    }

    /// Upper bound on exponential weights
    pub const EXP_CLIP: f64 = 100.0;

    /// Per-transition weight for an advantage estimate.
    pub fn weight(&self, advantage: f64) -> f64 {
        match self {
            FilterFunc::Binary => {
                if advantage > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            FilterFunc::Exp => advantage.exp().min(Self::EXP_CLIP),
        }
    }
}

impl fmt::Display for FilterFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(FilterFunc::Binary),
            "exp" => Ok(FilterFunc::Exp),
            other => Err(Error::config(format!(
                "unknown filter function '{other}'. Expected one of: binary, exp"
            ))),
        }
    }
}

/// Weights of the combined offline/online objective.
///
/// Built only through [`ObjectiveWeights::for_mode`], which keeps the
/// imitation flag and the weights consistent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    offline_coeff: f64,
    online_coeff: f64,
    reward_multiplier: f64,
    tau: f64,
    /// Accept every action (pure imitation)
    fake_filter: bool,
    use_multigamma: bool,
    filter: FilterFunc,
}

impl ObjectiveWeights {
    /// Weights for imitation (`il = true`) or offline RL.
    ///
    /// Imitation mode accepts every demonstrated action, disables the
    /// multi-gamma heads and pins the filter to [`FilterFunc::Binary`].
    pub fn for_mode(il: bool, filter: FilterFunc) -> Self {
        Self {
            offline_coeff: 1.0,
            online_coeff: 0.0,
            reward_multiplier: REWARD_MULTIPLIER,
            tau: TAU,
            fake_filter: il,
            use_multigamma: !il,
            filter: if il { FilterFunc::Binary } else { filter },
        }
    }

    /// Give live rollouts a share of the gradient.
    ///
    /// # Errors
    ///
    /// Rejected in imitation mode and for negative or non-finite values.
    pub fn with_online_coeff(mut self, coeff: f64) -> Result<Self> {
        if self.fake_filter && coeff != 0.0 {
            return Err(Error::config(
                "online coefficient must stay 0 in imitation mode",
            ));
        }
        if !coeff.is_finite() || coeff < 0.0 {
            return Err(Error::config(format!(
                "online coefficient must be a non-negative number, got {coeff}"
            )));
        }
        self.online_coeff = coeff;
        Ok(self)
    }

    pub fn offline_coeff(&self) -> f64 {
        self.offline_coeff
    }

    pub fn online_coeff(&self) -> f64 {
        self.online_coeff
    }

    pub fn reward_multiplier(&self) -> f64 {
        self.reward_multiplier
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn fake_filter(&self) -> bool {
        self.fake_filter
    }

    pub fn use_multigamma(&self) -> bool {
        self.use_multigamma
    }

    pub fn filter(&self) -> FilterFunc {
        self.filter
    }

    /// Whether live rollouts contribute gradient
    pub fn uses_online_data(&self) -> bool {
        self.online_coeff > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imitation_pins_filter_and_disables_online() {
        let weights = ObjectiveWeights::for_mode(true, FilterFunc::Exp);
        assert_eq!(weights.online_coeff(), 0.0);
        assert_eq!(weights.filter(), FilterFunc::Binary);
        assert!(weights.fake_filter());
        assert!(!weights.use_multigamma());
        assert!(weights.with_online_coeff(0.5).is_err());
    }

    #[test]
    fn test_offline_rl_keeps_filter_choice() {
        let weights = ObjectiveWeights::for_mode(false, FilterFunc::Exp);
        assert_eq!(weights.filter(), FilterFunc::Exp);
        assert!(weights.use_multigamma());
        assert_eq!(weights.tau(), TAU);
        assert_eq!(weights.reward_multiplier(), REWARD_MULTIPLIER);

        let mixed = weights.with_online_coeff(0.25).unwrap();
        assert!(mixed.uses_online_data());
        assert!(weights.with_online_coeff(f64::NAN).is_err());
    }

    #[test]
    fn test_filter_weights() {
        assert_eq!(FilterFunc::Binary.weight(0.3), 1.0);
        assert_eq!(FilterFunc::Binary.weight(-0.3), 0.0);
        assert_eq!(FilterFunc::Exp.weight(0.0), 1.0);
        assert_eq!(FilterFunc::Exp.weight(50.0), FilterFunc::EXP_CLIP);
    }
}
