use crate::ResolutionLevel;
use serde::{Deserialize, Serialize};

/// The fixed confidence table. Every score an edge can carry is computed
/// here; stage code never holds a numeric literal.
///
/// The CHA bonuses stack on the base: an abstract receiver contributes
/// `cha_abstract_bonus`, a class (rather than interface) receiver
/// contributes `cha_class_bonus`, so a call through an abstract class
/// scores `0.80 + 0.10 + 0.05 = 0.95`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePolicy {
    pub local_exact: f32,
    pub import_exact: f32,
    pub cha_base: f32,
    pub cha_abstract_bonus: f32,
    pub cha_class_bonus: f32,
    pub rta_resolved: f32,
    pub runtime_confirmed: f32,
    pub optional_chain_penalty: f32,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            local_exact: 1.00,
            import_exact: 0.95,
            cha_base: 0.80,
            cha_abstract_bonus: 0.10,
            cha_class_bonus: 0.05,
            rta_resolved: 0.90,
            runtime_confirmed: 1.00,
            optional_chain_penalty: 0.05,
        }
    }
}

impl ConfidencePolicy {
    /// Base score for the exact-resolution levels, with the optional-chain
    /// penalty applied. CHA scores are assembled via [`Self::cha_score`]
    /// instead because their bonuses depend on the receiver.
    pub fn score(&self, level: ResolutionLevel, optional_chaining: bool) -> f32 {
        let base = match level {
            ResolutionLevel::LocalExact => self.local_exact,
            ResolutionLevel::ImportExact => self.import_exact,
            ResolutionLevel::ChaResolved => self.cha_base,
            ResolutionLevel::RtaResolved => self.rta_resolved,
            ResolutionLevel::RuntimeConfirmed => self.runtime_confirmed,
        };
        if optional_chaining {
            base - self.optional_chain_penalty
        } else {
            base
        }
    }

    pub fn cha_score(&self, receiver_is_abstract: bool, receiver_is_class: bool) -> f32 {
        let mut score = self.cha_base;
        if receiver_is_abstract {
            score += self.cha_abstract_bonus;
        }
        if receiver_is_class {
            score += self.cha_class_bonus;
        }
        score
    }
}
