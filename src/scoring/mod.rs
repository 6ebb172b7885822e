// Candidate scoring for fairness-aware queue ranking

pub mod fairness_scorer;
pub mod weights;

pub use fairness_scorer::{
    compare_candidates, round_score, FairnessScorer, ScoreBreakdown, ScoreOutcome,
    ScoredCandidate, ScoringParams,
};
pub use weights::{PartialWeights, ScoringWeights, WeightFactor};
