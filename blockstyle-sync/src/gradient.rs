//! Multi-tag gradient generation.
//!
//! Two to four tag colors split the surface into equal hard-edged bands:
//! halves, thirds (120°) or quarters (90°). Handles use a conic gradient,
//! content backgrounds a left-to-right linear one.

use crate::config::MAX_TAGS;
use blockstyle_types::{Color, format_decimal};

/// Gradient geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientShape {
    /// Angular bands around the center, starting at the top.
    Conic,
    /// Horizontal bands, left to right.
    Linear,
}

/// Builds the CSS background for 2 to 4 colors.
///
/// Each color becomes one stop spanning an equal share of the surface, at
/// the given alpha. Returns `None` for fewer than two colors; colors past
/// the fourth are ignored.
pub fn generate_multi_color_background(
    colors: &[Color],
    shape: GradientShape,
    alpha: f64,
) -> Option<String> {
    let colors = &colors[..colors.len().min(MAX_TAGS)];
    if colors.len() < 2 {
        return None;
    }

    let (full, unit) = match shape {
        GradientShape::Conic => (360.0, "deg"),
        GradientShape::Linear => (100.0, "%"),
    };
    let step = full / colors.len() as f64;
    let stops: Vec<String> = colors
        .iter()
        .enumerate()
        .map(|(i, color)| {
            let start = step * i as f64;
            let end = if i + 1 == colors.len() {
                full
            } else {
                step * (i + 1) as f64
            };
            format!(
                "{} {}{unit} {}{unit}",
                color.to_rgba(alpha),
                format_decimal(start),
                format_decimal(end)
            )
        })
        .collect();

    Some(match shape {
        GradientShape::Conic => format!("conic-gradient({})", stops.join(", ")),
        GradientShape::Linear => format!("linear-gradient(to right, {})", stops.join(", ")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors(n: usize) -> Vec<Color> {
        (0..n).map(|i| Color::rgb(i as u8 * 10, 0, 0)).collect()
    }

    #[test]
    fn last_stop_closes_exactly() {
        let css = generate_multi_color_background(&colors(3), GradientShape::Linear, 0.5).unwrap();
        assert!(css.ends_with("66.67% 100%)"), "{css}");
    }
}
