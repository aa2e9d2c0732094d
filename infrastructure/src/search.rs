use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    DotProduct,
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "dot" | "dot_product" => Ok(SimilarityMetric::DotProduct),
            other => Err(format!("unknown similarity metric {other:?}")),
        }
    }
}

impl SimilarityMetric {
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => SearchEngine::cosine_similarity(a, b),
            SimilarityMetric::DotProduct => SearchEngine::dot_product(a, b),
        }
    }
}

pub struct SearchEngine;

impl SearchEngine {
    /// Cosine of the angle between `a` and `b`. A zero vector scores 0.
    /// Sums are taken in f64 so large components cannot overflow to NaN.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product = dot_f64(a, b);
        let norm_a = dot_f64(a, a).sqrt();
        let norm_b = dot_f64(b, b).sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        finite_or_zero(dot_product / (norm_a * norm_b))
    }

    pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
        let score = dot_f64(a, b);
        if score.is_nan() {
            return 0.0;
        }
        // Out-of-range sums saturate instead of becoming infinite.
        score.clamp(f32::MIN as f64, f32::MAX as f64) as f32
    }

    /// Score every candidate against `query` and return `(position, score)`
    /// of the best `top_k`, best first. Equal scores keep candidate order.
    pub fn rank<'a, I>(
        query: &[f32],
        candidates: I,
        top_k: usize,
        metric: SimilarityMetric,
    ) -> Vec<(usize, f32)>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut similarities: Vec<(usize, f32)> = candidates
            .into_iter()
            .enumerate()
            .map(|(position, vector)| (position, metric.score(query, vector)))
            .collect();

        similarities.sort_by(|a, b| b.1.total_cmp(&a.1));
        similarities.truncate(top_k);
        similarities
    }
}

fn dot_f64(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn finite_or_zero(score: f64) -> f32 {
    let score = score as f32;
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
