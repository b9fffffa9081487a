// Numeric helpers shared by the scorers

use std::collections::HashSet;
use std::hash::Hash;

/// Normalize a score to [0, 1] range
pub fn normalize_score(score: f64, min: f64, max: f64) -> f64 {
    if max - min < f64::EPSILON {
        0.5
    } else {
        ((score - min) / (max - min)).clamp(0.0, 1.0)
    }
}

/// Map a non-negative count onto [0, 1] on a log scale, saturating at `reference`
pub fn log_scale(value: f64, reference: f64) -> f64 {
    if value <= 0.0 || reference <= 0.0 {
        return 0.0;
    }
    ((1.0 + value).ln() / (1.0 + reference).ln()).clamp(0.0, 1.0)
}

/// |a ∩ b| / |a ∪ b|, zero when both are empty
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = (a.len() + b.len()) as f64 - intersection;
    intersection / union
}
