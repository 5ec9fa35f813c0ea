//! Market-impact view model for analyzed items.
//!
//! Normalizes raw per-category impact ratings, builds the positive and
//! negative radar chart data, polls per-category detail until it is ready
//! and lays chart labels out around the radar.

pub mod aggregator;
pub mod cache;
pub mod engine;
pub mod layout;
pub mod normalizer;
pub mod polling;
pub mod sizing;

pub use aggregator::{aggregate, ChartBucket, ChartData, ChartPoint, NEGATIVE_BUCKET_LIMIT};
pub use cache::ResultCache;
pub use engine::{EngineConfig, ImpactEngine, LabelActivation};
pub use layout::{layout_points, ContainerSize, LayoutConfig, LayoutPoint, RadialLayout, TextAlign};
pub use normalizer::{coerce_score, normalize, NormalizedRating};
pub use polling::{PollingConfig, PollingCoordinator, PollingEntry, PollingPhase, PollingStatus};
pub use sizing::{ContainerSizeSource, ContainerSizes};
