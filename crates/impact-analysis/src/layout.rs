//! Radial Layout Engine
//!
//! Places chart labels evenly around a circle, starting at the top and going
//! clockwise, with alignment and a small nudge depending on which side of
//! the circle a label lands on.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use crate::aggregator::ChartPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Right,
    Center,
}

/// Pixel dimensions of a chart container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_measured(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Square container assumed when the real size is unknown
    pub fallback_container_px: f64,
    pub radius_factor: f64,
    pub large_radius_factor: f64,
    pub horizontal_nudge_px: f64,
    pub vertical_nudge_px: f64,
    /// Scale applied to both nudges on large viewports
    pub large_nudge_scale: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            fallback_container_px: 300.0,
            radius_factor: 0.45,
            large_radius_factor: 0.42,
            horizontal_nudge_px: 10.0,
            vertical_nudge_px: 5.0,
            large_nudge_scale: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPoint {
    pub category_key: String,
    pub display_label: String,
    pub value: f64,
    pub angle_radians: f64,
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Right,
    Left,
    Bottom,
    Top,
}

/// Which side of the circle an angle falls on
fn region(angle: f64) -> Region {
    // Bring into (-PI, PI] so the bands below cover the whole circle
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    if a.abs() < FRAC_PI_4 {
        Region::Right
    } else if a.abs() > 3.0 * FRAC_PI_4 {
        Region::Left
    } else if a > 0.0 {
        Region::Bottom
    } else {
        Region::Top
    }
}

/// Angle of point `index` out of `count`; index 0 sits at the top
pub fn point_angle(index: usize, count: usize) -> f64 {
    (index as f64 / count as f64) * TAU - FRAC_PI_2
}

/// Compute label positions for one chart side
pub fn layout_points(
    points: &[ChartPoint],
    size: Option<ContainerSize>,
    large_viewport: bool,
    config: &LayoutConfig,
) -> Vec<LayoutPoint> {
    let (width, height) = match size.filter(ContainerSize::is_measured) {
        Some(s) => (s.width, s.height),
        None => (config.fallback_container_px, config.fallback_container_px),
    };

    let container = width.min(height);
    let radius = container
        * if large_viewport {
            config.large_radius_factor
        } else {
            config.radius_factor
        };
    let nudge_scale = if large_viewport { config.large_nudge_scale } else { 1.0 };
    let (center_x, center_y) = (width / 2.0, height / 2.0);

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let angle = point_angle(i, points.len());
            let x = angle.cos() * radius;
            let y = angle.sin() * radius;

            let (text_align, x_offset, y_offset) = match region(angle) {
                Region::Right => (TextAlign::Left, config.horizontal_nudge_px * nudge_scale, 0.0),
                Region::Left => (TextAlign::Right, -config.horizontal_nudge_px * nudge_scale, 0.0),
                Region::Bottom => (TextAlign::Center, 0.0, config.vertical_nudge_px * nudge_scale),
                Region::Top => (TextAlign::Center, 0.0, -config.vertical_nudge_px * nudge_scale),
            };

            LayoutPoint {
                category_key: p.category_key.clone(),
                display_label: p.label.clone(),
                value: p.value,
                angle_radians: angle,
                pixel_x: center_x + x + x_offset,
                pixel_y: center_y + y + y_offset,
                text_align,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct LayoutInputs {
    points: Vec<ChartPoint>,
    size: Option<ContainerSize>,
    large_viewport: bool,
}

/// Memoized layout for one chart side.
///
/// Any change in the points, their values, the container size or the
/// viewport class recomputes the whole list.
#[derive(Debug, Default)]
pub struct RadialLayout {
    config: LayoutConfig,
    inputs: Option<LayoutInputs>,
    positions: Vec<LayoutPoint>,
    recomputations: usize,
}

impl RadialLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn positions(
        &mut self,
        points: &[ChartPoint],
        size: Option<ContainerSize>,
        large_viewport: bool,
    ) -> &[LayoutPoint] {
        let unchanged = self.inputs.as_ref().is_some_and(|prev| {
            prev.points == points && prev.size == size && prev.large_viewport == large_viewport
        });

        if !unchanged {
            self.positions = layout_points(points, size, large_viewport, &self.config);
            self.inputs = Some(LayoutInputs {
                points: points.to_vec(),
                size,
                large_viewport,
            });
            self.recomputations += 1;
        }

        &self.positions
    }

    /// How many times the positions were rebuilt
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }
}
