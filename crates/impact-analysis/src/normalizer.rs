//! Rating Normalizer
//!
//! Turns a raw impact record into the validated, signed categories that feed
//! both the chart aggregator and the polling coordinator.

use impact_core::{display_name, ImpactCategory, ImpactSign, RawCategoryRating, RawImpactRecord, RawScore};
use serde::{Deserialize, Serialize};

/// Markers upstream uses when a category could not be scored
const UNAVAILABLE_MARKERS: &[&str] = &["not available", "n/a"];

/// Validated categories of one item, in record order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRating {
    pub categories: Vec<ImpactCategory>,
    pub positive_count: usize,
    pub negative_count: usize,
}

impl NormalizedRating {
    pub fn get(&self, key: &str) -> Option<&ImpactCategory> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn positives(&self) -> impl Iterator<Item = &ImpactCategory> {
        self.categories.iter().filter(|c| c.sign() == ImpactSign::Positive)
    }

    pub fn negatives(&self) -> impl Iterator<Item = &ImpactCategory> {
        self.categories.iter().filter(|c| c.sign() == ImpactSign::Negative)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Coerce a raw score to a usable value.
///
/// Returns `None` for absent, unavailable, unparsable, non-finite and zero
/// scores.
pub fn coerce_score(rating: &RawCategoryRating) -> Option<f64> {
    let value = match rating.score.as_ref()? {
        RawScore::Number(n) => *n,
        RawScore::Text(text) => {
            let text = text.trim();
            if UNAVAILABLE_MARKERS.iter().any(|m| text.eq_ignore_ascii_case(m)) {
                return None;
            }
            text.parse::<f64>().ok()?
        }
    };

    if !value.is_finite() || value == 0.0 {
        return None;
    }
    Some(value)
}

/// Filter and classify a raw impact record
pub fn normalize(record: &RawImpactRecord) -> NormalizedRating {
    let mut rating = NormalizedRating::default();

    for (key, raw) in record.categories.iter() {
        let Some(score) = coerce_score(raw) else {
            continue;
        };

        if score > 0.0 {
            rating.positive_count += 1;
        } else {
            rating.negative_count += 1;
        }

        rating.categories.push(ImpactCategory {
            key: key.to_string(),
            display_label: display_name(key).to_string(),
            score,
            explanation: raw.explanation.clone(),
        });
    }

    tracing::debug!(
        "Normalized {} of {} categories ({} positive, {} negative)",
        rating.len(),
        record.categories.len(),
        rating.positive_count,
        rating.negative_count
    );

    rating
}

#[cfg(test)]
mod tests {
    use super::*;
    use impact_core::CategoryRatings;

    fn record(entries: Vec<(&str, RawCategoryRating)>) -> RawImpactRecord {
        RawImpactRecord {
            categories: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<CategoryRatings>(),
            ..Default::default()
        }
    }

    #[test]
    fn test_excludes_zero_and_unavailable() {
        let rating = normalize(&record(vec![
            ("stocks", RawCategoryRating::number(0.0, "flat")),
            ("bonds", RawCategoryRating::text("Not Available", "")),
            ("crypto", RawCategoryRating::text("n/a", "")),
            ("commodities", RawCategoryRating::text("0", "")),
            ("currencies", RawCategoryRating::number(1.5, "dollar strength")),
        ]));

        assert_eq!(rating.len(), 1);
        assert_eq!(rating.categories[0].key, "currencies");
        assert_eq!(rating.positive_count, 1);
        assert_eq!(rating.negative_count, 0);
    }

    #[test]
    fn test_parses_string_scores_and_keeps_order() {
        let rating = normalize(&record(vec![
            ("real_estate", RawCategoryRating::text(" -2.5 ", "rates up")),
            ("stocks", RawCategoryRating::number(3.0, "")),
            ("bonds", RawCategoryRating::text("abc", "")),
            ("futures", RawCategoryRating::text("-0.75", "")),
        ]));

        let keys: Vec<&str> = rating.keys().collect();
        assert_eq!(keys, vec!["real_estate", "stocks", "futures"]);
        assert_eq!(rating.categories[0].score, -2.5);
        assert_eq!(rating.categories[0].display_label, "Real Estate");
        assert_eq!(rating.categories[0].explanation, "rates up");
        assert_eq!(rating.positive_count, 1);
        assert_eq!(rating.negative_count, 2);
    }

    #[test]
    fn test_rejects_missing_and_non_finite() {
        let missing = RawCategoryRating {
            score: None,
            explanation: "pending".to_string(),
        };
        assert_eq!(coerce_score(&missing), None);
        assert_eq!(coerce_score(&RawCategoryRating::text("NaN", "")), None);
        assert_eq!(coerce_score(&RawCategoryRating::text("inf", "")), None);
        assert_eq!(coerce_score(&RawCategoryRating::number(f64::NAN, "")), None);
        assert_eq!(coerce_score(&RawCategoryRating::number(-4.0, "")), Some(-4.0));
    }
}
