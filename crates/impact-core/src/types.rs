use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Score as it arrives from upstream: a number, or a string that may hold a
/// number or the "not available" marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScore {
    Number(f64),
    Text(String),
}

/// One category entry of a raw impact record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCategoryRating {
    #[serde(default)]
    pub score: Option<RawScore>,
    #[serde(default)]
    pub explanation: String,
}

impl RawCategoryRating {
    pub fn number(score: f64, explanation: &str) -> Self {
        Self {
            score: Some(RawScore::Number(score)),
            explanation: explanation.to_string(),
        }
    }

    pub fn text(score: &str, explanation: &str) -> Self {
        Self {
            score: Some(RawScore::Text(score.to_string())),
            explanation: explanation.to_string(),
        }
    }
}

/// Category ratings in the order they appeared in the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRatings(pub Vec<(String, RawCategoryRating)>);

impl CategoryRatings {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawCategoryRating)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RawCategoryRating)> for CategoryRatings {
    fn from_iter<I: IntoIterator<Item = (String, RawCategoryRating)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for CategoryRatings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, rating) in &self.0 {
            map.serialize_entry(key, rating)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryRatings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = CategoryRatings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category key to {score, explanation}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, RawCategoryRating)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, rating)) = access.next_entry::<String, RawCategoryRating>()? {
                    // Later duplicates replace earlier ones but keep the first position
                    if let Some(slot) = entries.iter_mut().find(|entry| entry.0 == key) {
                        slot.1 = rating;
                    } else {
                        entries.push((key, rating));
                    }
                }
                Ok(CategoryRatings(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Parallel label/value arrays feeding one chart side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl ChartSeries {
    pub fn new(labels: Vec<String>, values: Vec<f64>) -> Self {
        Self { labels, values }
    }

    /// Pairs labels with values; extra entries on either side are ignored.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() || self.values.is_empty()
    }
}

/// Impact rating record for one content item as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawImpactRecord {
    #[serde(default)]
    pub categories: CategoryRatings,
    #[serde(default, alias = "positive_bucket_raw")]
    pub positive_bucket_raw: Option<ChartSeries>,
    #[serde(default, alias = "negative_bucket_raw")]
    pub negative_bucket_raw: Option<ChartSeries>,
}

impl RawImpactRecord {
    pub fn from_json(json: &str) -> crate::ImpactResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactSign {
    Positive,
    Negative,
}

/// A validated, signed impact dimension of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactCategory {
    pub key: String,
    pub display_label: String,
    /// Signed, finite, never zero
    pub score: f64,
    pub explanation: String,
}

impl ImpactCategory {
    pub fn sign(&self) -> ImpactSign {
        if self.score > 0.0 {
            ImpactSign::Positive
        } else {
            ImpactSign::Negative
        }
    }
}

/// Instrument touched by an item within one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedInstrument {
    pub ticker: String,
    #[serde(alias = "impactScore")]
    pub impact_score: f64,
}

impl AffectedInstrument {
    pub fn new(ticker: &str, impact_score: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            impact_score,
        }
    }
}

/// Upstream processing state of a category analysis (wire value 0 or 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum AnalysisStatus {
    Processing,
    Complete,
}

impl From<u8> for AnalysisStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => AnalysisStatus::Complete,
            _ => AnalysisStatus::Processing,
        }
    }
}

impl From<AnalysisStatus> for u8 {
    fn from(status: AnalysisStatus) -> Self {
        match status {
            AnalysisStatus::Processing => 0,
            AnalysisStatus::Complete => 1,
        }
    }
}

/// Response of the category analysis fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAnalysis {
    pub status: AnalysisStatus,
    #[serde(default)]
    pub instruments: Vec<AffectedInstrument>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl CategoryAnalysis {
    pub fn complete(instruments: Vec<AffectedInstrument>) -> Self {
        Self {
            status: AnalysisStatus::Complete,
            instruments,
            analyzed_at: Some(Utc::now()),
        }
    }

    pub fn processing(instruments: Vec<AffectedInstrument>) -> Self {
        Self {
            status: AnalysisStatus::Processing,
            instruments,
            analyzed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == AnalysisStatus::Complete
    }
}

/// The two chart regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartSide {
    Positive,
    Negative,
}

impl ChartSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartSide::Positive => "positive",
            ChartSide::Negative => "negative",
        }
    }
}
