use crate::record::{Sentiment, SentimentLabel};

/// Maps two-class (positive/negative) probabilities onto the three labels.
///
/// | Condition                          | Label    | Score               |
/// |------------------------------------|----------|---------------------|
/// | max(p_pos, p_neg) < `threshold`    | neutral  | 1 - max(p_pos, p_neg) |
/// | \|p_pos - p_neg\| < `tie_margin`   | neutral  | 1 - max(p_pos, p_neg) |
/// | otherwise                          | argmax   | winning probability |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeutralPolicy {
    pub threshold: f64,
    pub tie_margin: f64,
}

impl Default for NeutralPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.65,
            tie_margin: 0.08,
        }
    }
}

impl NeutralPolicy {
    pub fn apply(&self, p_pos: f64, p_neg: f64) -> Sentiment {
        let p_max = p_pos.max(p_neg);

        let label = if p_max < self.threshold || (p_pos - p_neg).abs() < self.tie_margin {
            SentimentLabel::Neutral
        } else if p_pos >= p_neg {
            SentimentLabel::Positive
        } else {
            SentimentLabel::Negative
        };

        let score = match label {
            SentimentLabel::Positive => p_pos,
            SentimentLabel::Negative => p_neg,
            SentimentLabel::Neutral => 1.0 - p_max,
        };

        Sentiment {
            label,
            score: score.clamp(0.0, 1.0),
        }
    }
}
