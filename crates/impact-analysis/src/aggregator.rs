//! Chart Data Aggregator
//!
//! Builds the positive and negative chart buckets for an item. Values always
//! come from the normalized categories; caller-supplied raw buckets only
//! decide membership and order.

use impact_core::{display_name, key_for_label, ChartSide, RawImpactRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::normalizer::NormalizedRating;

/// The negative chart only shows the strongest offenders
pub const NEGATIVE_BUCKET_LIMIT: usize = 3;

/// A side is hidden when it has at most this many points...
const SPARSE_SIDE_MAX: usize = 2;
/// ...while the opposite side has at least this many
const DOMINANT_SIDE_MIN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub category_key: String,
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartBucket {
    pub points: Vec<ChartPoint>,
}

impl ChartBucket {
    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|p| p.label.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Find a point by its chart label or category key
    pub fn find(&self, label: &str) -> Option<&ChartPoint> {
        let key = key_for_label(label);
        self.points
            .iter()
            .find(|p| p.label == label || p.category_key == key)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub positive: ChartBucket,
    pub negative: ChartBucket,
    pub hide_positive: bool,
    pub hide_negative: bool,
}

impl ChartData {
    pub fn bucket(&self, side: ChartSide) -> &ChartBucket {
        match side {
            ChartSide::Positive => &self.positive,
            ChartSide::Negative => &self.negative,
        }
    }

    pub fn is_hidden(&self, side: ChartSide) -> bool {
        match side {
            ChartSide::Positive => self.hide_positive,
            ChartSide::Negative => self.hide_negative,
        }
    }
}

/// Flip unsigned magnitudes so the negative bucket holds negative values.
///
/// Applies only when every non-zero value is non-negative. Returns the
/// corrected values and whether a flip happened.
pub fn correct_negative_signs(values: &[f64]) -> (Vec<f64>, bool) {
    let unsigned = values.iter().filter(|v| **v != 0.0).all(|v| *v >= 0.0);
    if unsigned {
        (values.iter().map(|v| -v).collect(), true)
    } else {
        (values.to_vec(), false)
    }
}

/// Hide a side that is sparse next to a richly populated opposite side
pub fn suppression(positive_count: usize, negative_count: usize) -> (bool, bool) {
    let hide_positive = negative_count >= DOMINANT_SIDE_MIN && positive_count <= SPARSE_SIDE_MAX;
    let hide_negative = positive_count >= DOMINANT_SIDE_MIN && negative_count <= SPARSE_SIDE_MAX;
    (hide_positive, hide_negative)
}

pub fn aggregate(rating: &NormalizedRating, record: &RawImpactRecord) -> ChartData {
    let positive = match &record.positive_bucket_raw {
        Some(raw) => from_raw(rating, raw.pairs(), |score| score > 0.0),
        None => from_rating(rating, |score| score > 0.0),
    };

    let mut negative = match &record.negative_bucket_raw {
        Some(raw) => {
            let (corrected, flipped) = correct_negative_signs(&raw.values);
            if flipped {
                tracing::debug!("Negative bucket arrived unsigned, flipped {} values", corrected.len());
            }
            let pairs = raw
                .labels
                .iter()
                .map(String::as_str)
                .zip(corrected.iter().copied());
            from_raw(rating, pairs, |score| score < 0.0)
        }
        None => from_rating(rating, |score| score < 0.0),
    };

    negative.points.sort_by(|a, b| {
        b.value
            .abs()
            .partial_cmp(&a.value.abs())
            .unwrap_or(Ordering::Equal)
    });
    negative.points.truncate(NEGATIVE_BUCKET_LIMIT);

    let (hide_positive, hide_negative) = suppression(rating.positive_count, rating.negative_count);

    ChartData {
        positive,
        negative,
        hide_positive,
        hide_negative,
    }
}

fn point(key: &str, score: f64) -> ChartPoint {
    ChartPoint {
        category_key: key.to_string(),
        label: display_name(key).to_string(),
        value: score,
    }
}

fn from_rating(rating: &NormalizedRating, keep: impl Fn(f64) -> bool) -> ChartBucket {
    ChartBucket {
        points: rating
            .categories
            .iter()
            .filter(|c| keep(c.score))
            .map(|c| point(&c.key, c.score))
            .collect(),
    }
}

fn from_raw<'a>(
    rating: &NormalizedRating,
    pairs: impl Iterator<Item = (&'a str, f64)>,
    keep: impl Fn(f64) -> bool,
) -> ChartBucket {
    let mut seen = HashSet::new();
    let mut points = Vec::new();

    for (label, raw_value) in pairs {
        if raw_value == 0.0 {
            continue;
        }
        let key = key_for_label(label);
        let Some(category) = rating.get(key) else {
            continue;
        };
        if !keep(category.score) || !seen.insert(category.key.clone()) {
            continue;
        }
        points.push(point(&category.key, category.score));
    }

    ChartBucket { points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use impact_core::{CategoryRatings, ChartSeries, RawCategoryRating};

    fn record(scores: &[(&str, f64)]) -> RawImpactRecord {
        RawImpactRecord {
            categories: scores
                .iter()
                .map(|(k, s)| (k.to_string(), RawCategoryRating::number(*s, "")))
                .collect::<CategoryRatings>(),
            ..Default::default()
        }
    }

    fn series(labels: &[&str], values: &[f64]) -> Option<ChartSeries> {
        Some(ChartSeries::new(
            labels.iter().map(|l| l.to_string()).collect(),
            values.to_vec(),
        ))
    }

    fn build(record: &RawImpactRecord) -> ChartData {
        aggregate(&normalize(record), record)
    }

    #[test]
    fn test_sign_correction_flips_unsigned_magnitudes() {
        assert_eq!(correct_negative_signs(&[2.0, 3.0, 0.0]), (vec![-2.0, -3.0, -0.0], true));
        assert_eq!(correct_negative_signs(&[-2.0, 3.0]), (vec![-2.0, 3.0], false));
    }

    #[test]
    fn test_unsigned_negative_bucket_is_rederived_and_sorted() {
        let mut rec = record(&[("stocks", -2.0), ("bonds", -3.0), ("crypto", 0.0)]);
        rec.negative_bucket_raw = series(&["Stocks", "Bonds", "Crypto"], &[2.0, 3.0, 0.0]);

        let data = build(&rec);
        assert_eq!(data.negative.values(), vec![-3.0, -2.0]);
        assert_eq!(data.negative.labels(), vec!["Bonds", "Stocks"]);
    }

    #[test]
    fn test_negative_bucket_keeps_top_three() {
        let data = build(&record(&[
            ("stocks", -1.0),
            ("bonds", -4.0),
            ("crypto", -2.5),
            ("etfs", -0.5),
            ("futures", -3.0),
        ]));

        assert_eq!(data.negative.len(), NEGATIVE_BUCKET_LIMIT);
        assert_eq!(data.negative.values(), vec![-4.0, -3.0, -2.5]);
    }

    #[test]
    fn test_raw_values_never_override_normalized_scores() {
        let mut rec = record(&[("stocks", 2.0), ("bonds", -1.0), ("indices", 0.5)]);
        // Raw positive carries a stale magnitude and a category that is negative
        rec.positive_bucket_raw = series(&["stocks", "Bonds", "Indices", "Stocks"], &[9.0, 1.0, 0.0, 9.0]);

        let data = build(&rec);
        assert_eq!(data.positive.labels(), vec!["Stocks"]);
        assert_eq!(data.positive.values(), vec![2.0]);
    }

    #[test]
    fn test_positive_bucket_is_unbounded_without_raw() {
        let data = build(&record(&[
            ("stocks", 1.0),
            ("bonds", 2.0),
            ("crypto", 3.0),
            ("etfs", 4.0),
            ("options", -1.0),
        ]));

        assert_eq!(data.positive.len(), 4);
        assert_eq!(data.positive.labels(), vec!["Stocks", "Bonds", "Crypto", "ETFs"]);
    }

    #[test]
    fn test_hides_sparse_positive_side() {
        let data = build(&record(&[("stocks", -1.0), ("bonds", -2.0), ("crypto", -3.0), ("etfs", 1.0)]));
        assert!(data.hide_positive);
        assert!(!data.hide_negative);
    }

    #[test]
    fn test_hides_sparse_negative_side() {
        let data = build(&record(&[("stocks", 1.0), ("bonds", 2.0), ("crypto", 3.0), ("etfs", -1.0)]));
        assert!(data.hide_negative);
        assert!(!data.hide_positive);
    }

    #[test]
    fn test_suppression_uses_untruncated_counts() {
        // Four negatives are truncated to three on the chart but all count
        assert_eq!(suppression(3, 4), (false, false));
        assert_eq!(suppression(2, 4), (true, false));
        assert_eq!(suppression(0, 0), (false, false));
    }

    #[test]
    fn test_find_by_label_or_key() {
        let data = build(&record(&[("real_estate", 1.5)]));
        assert_eq!(data.positive.find("Real Estate").unwrap().value, 1.5);
        assert_eq!(data.positive.find("real_estate").unwrap().label, "Real Estate");
        assert!(data.positive.find("Bonds").is_none());
    }
}
