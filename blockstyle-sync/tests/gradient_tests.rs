use blockstyle_sync::{GradientShape, generate_multi_color_background};
use blockstyle_types::Color;
use pretty_assertions::assert_eq;

fn colors(hexes: &[&str]) -> Vec<Color> {
    hexes.iter().map(|h| Color::parse_hex(h).unwrap()).collect()
}

fn stop_count(css: &str) -> usize {
    css.matches("rgba(").count()
}

#[test]
fn fewer_than_two_colors_is_no_gradient() {
    assert_eq!(
        generate_multi_color_background(&[], GradientShape::Conic, 0.75),
        None
    );
    assert_eq!(
        generate_multi_color_background(&colors(&["#ff0000"]), GradientShape::Linear, 0.45),
        None
    );
}

#[test]
fn two_colors_conic_halves() {
    let css = generate_multi_color_background(
        &colors(&["#aa0000", "#0000bb"]),
        GradientShape::Conic,
        0.75,
    )
    .unwrap();
    assert_eq!(
        css,
        "conic-gradient(rgba(170,0,0,0.75) 0deg 180deg, rgba(0,0,187,0.75) 180deg 360deg)"
    );
}

#[test]
fn two_colors_linear_halves() {
    let css = generate_multi_color_background(
        &colors(&["#aa0000", "#0000bb"]),
        GradientShape::Linear,
        0.45,
    )
    .unwrap();
    assert_eq!(
        css,
        "linear-gradient(to right, rgba(170,0,0,0.45) 0% 50%, rgba(0,0,187,0.45) 50% 100%)"
    );
}

#[test]
fn three_colors_at_thirds() {
    let css = generate_multi_color_background(
        &colors(&["#111111", "#222222", "#333333"]),
        GradientShape::Conic,
        0.75,
    )
    .unwrap();
    assert_eq!(stop_count(&css), 3);
    assert!(css.contains("0deg 120deg"), "{css}");
    assert!(css.contains("120deg 240deg"), "{css}");
    assert!(css.contains("240deg 360deg"), "{css}");
}

#[test]
fn four_colors_at_quarters() {
    let css = generate_multi_color_background(
        &colors(&["#111111", "#222222", "#333333", "#444444"]),
        GradientShape::Linear,
        0.45,
    )
    .unwrap();
    assert_eq!(stop_count(&css), 4);
    for band in ["0% 25%", "25% 50%", "50% 75%", "75% 100%"] {
        assert!(css.contains(band), "{band} missing in {css}");
    }
}

#[test]
fn colors_past_the_fourth_are_ignored() {
    let css = generate_multi_color_background(
        &colors(&["#111111", "#222222", "#333333", "#444444", "#555555"]),
        GradientShape::Conic,
        0.75,
    )
    .unwrap();
    assert_eq!(stop_count(&css), 4);
    assert!(!css.contains("85,85,85"), "{css}");
}
