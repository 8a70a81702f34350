/// Keywords whose presence suggests a role output actually engaged with the
/// task rather than producing a generic non-answer ("Quality
/// Evaluator", factor 2).
const POSITIVE_KEYWORDS: &[&str] = &[
    "implement",
    "test",
    "because",
    "step",
    "verify",
    "result",
    "changed",
    "fixed",
];

/// Phrases that usually indicate the adapter punted rather than produced
/// usable output.
const HEDGE_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "as an ai",
    "i don't have access",
    "unable to complete",
];

const WEIGHT_LENGTH: f64 = 0.2;
const WEIGHT_KEYWORDS: f64 = 0.25;
const WEIGHT_RELIABILITY: f64 = 0.25;
const WEIGHT_STRUCTURE: f64 = 0.3;

/// A breakdown of the four weighted factors behind one confidence score, so
/// the reasons a task was flagged `QualityConcern` can be surfaced rather
/// than just the final number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityFactors {
    pub length_score: f64,
    pub keyword_score: f64,
    pub reliability_score: f64,
    pub structure_score: f64,
}

impl QualityFactors {
    pub fn weighted_confidence(&self) -> f64 {
        let raw = self.length_score * WEIGHT_LENGTH
            + self.keyword_score * WEIGHT_KEYWORDS
            + self.reliability_score * WEIGHT_RELIABILITY
            + self.structure_score * WEIGHT_STRUCTURE;
        raw.clamp(0.0, 1.0)
    }
}

/// Pure, deterministic confidence scoring over an adapter's textual output
/// Never calls out to a model itself — the score is a heuristic
/// gate, not a second opinion.
pub struct QualityEvaluator;

impl QualityEvaluator {
    /// `reliability_prior` is the adapter's configured prior, already
    /// clamped to `[0.5, 0.85]` by `AdapterConfig::reliability_prior`.
    pub fn score(output: &str, reliability_prior: f64) -> QualityFactors {
        QualityFactors {
            length_score: length_score(output),
            keyword_score: keyword_score(output),
            reliability_score: reliability_prior.clamp(0.0, 1.0),
            structure_score: structure_score(output),
        }
    }

    pub fn confidence(output: &str, reliability_prior: f64) -> f64 {
        Self::score(output, reliability_prior).weighted_confidence()
    }
}

fn length_score(output: &str) -> f64 {
    let len = output.trim().chars().count();
    // Saturates at 400 characters; near-empty output scores near zero.
    (len as f64 / 400.0).clamp(0.0, 1.0)
}

fn keyword_score(output: &str) -> f64 {
    let lower = output.to_lowercase();
    let hits = POSITIVE_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    let hedges = HEDGE_PHRASES.iter().filter(|h| lower.contains(*h)).count();

    let positive = (hits as f64 / POSITIVE_KEYWORDS.len() as f64).clamp(0.0, 1.0);
    let penalty = (hedges as f64 * 0.5).clamp(0.0, 1.0);
    (positive - penalty).clamp(0.0, 1.0)
}

fn structure_score(output: &str) -> f64 {
    let has_multiple_lines = output.lines().filter(|l| !l.trim().is_empty()).count() > 1;
    let has_code_fence = output.contains("```");
    let has_list_marker = output
        .lines()
        .any(|l| l.trim_start().starts_with('-') || l.trim_start().starts_with(|c: char| c.is_ascii_digit()));

    let mut score: f64 = 0.0;
    if has_multiple_lines {
        score += 0.4;
    }
    if has_code_fence {
        score += 0.3;
    }
    if has_list_marker {
        score += 0.3;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_scores_near_zero() {
        let confidence = QualityEvaluator::confidence("", 0.7);
        assert!(confidence < 0.2);
    }

    #[test]
    fn rich_structured_output_scores_higher_than_terse_one() {
        let terse = "ok";
        let rich = "I implemented the change.\n\nSteps:\n- updated the handler\n- added a test\n\n```rust\nfn f() {}\n```\nVerify the result because it was fixed.";

        let terse_score = QualityEvaluator::confidence(terse, 0.7);
        let rich_score = QualityEvaluator::confidence(rich, 0.7);
        assert!(rich_score > terse_score);
    }

    #[test]
    fn hedging_language_reduces_keyword_score() {
        let hedge = "I cannot complete this task, I don't have access to the repository.";
        let factors = QualityEvaluator::score(hedge, 0.7);
        assert_eq!(factors.keyword_score, 0.0);
    }

    #[test]
    fn confidence_is_always_within_unit_interval() {
        let factors = QualityFactors {
            length_score: 1.0,
            keyword_score: 1.0,
            reliability_score: 1.0,
            structure_score: 1.0,
        };
        assert!((factors.weighted_confidence() - 1.0).abs() < 1e-9);
    }
}
