use blockstyle_model::{IconSpec, ResolvedStyle, StyleSource};
use blockstyle_types::Color;
use serde_json::json;

#[test]
fn none_style_is_unstyled() {
    let style = ResolvedStyle::none();
    assert!(style.is_none());
    assert!(!style.is_multi_tag());
    assert_eq!(style, ResolvedStyle::default());
}

#[test]
fn multi_tag_needs_two_colors() {
    let mut style = ResolvedStyle {
        display_color: Some(Color::rgb(1, 1, 1)),
        background_base: Some(Color::rgb(1, 1, 1)),
        icon: None,
        source: StyleSource::Tag,
        tag_colors: vec![Color::rgb(1, 1, 1)],
    };
    assert!(!style.is_multi_tag());
    style.tag_colors.push(Color::rgb(2, 2, 2));
    assert!(style.is_multi_tag());
}

#[test]
fn source_serializes_lowercase() {
    assert_eq!(serde_json::to_value(StyleSource::Own).unwrap(), json!("self"));
    assert_eq!(serde_json::to_value(StyleSource::Tag).unwrap(), json!("tag"));
    assert_eq!(serde_json::to_value(StyleSource::Unstyled).unwrap(), json!("none"));
    assert_eq!(StyleSource::Own.as_str(), "self");
}

#[test]
fn resolved_style_serializes_camel_case() {
    let style = ResolvedStyle {
        display_color: Some(Color::rgb(0x11, 0x11, 0x11)),
        background_base: None,
        icon: Some("ti ti-flag".into()),
        source: StyleSource::Tag,
        tag_colors: vec![Color::rgb(0x11, 0x11, 0x11), Color::rgb(0x22, 0x22, 0x22)],
    };
    let value = serde_json::to_value(&style).unwrap();
    assert_eq!(value["displayColor"], json!("#111111"));
    assert_eq!(value["tagColors"], json!(["#111111", "#222222"]));
    assert_eq!(value["source"], json!("tag"));
}

#[test]
fn icon_classes() {
    assert_eq!(
        IconSpec::parse("ti ti-star"),
        Some(IconSpec::Classes(vec!["ti".into(), "ti-star".into()]))
    );
    assert_eq!(
        IconSpec::parse(" ti-bolt "),
        Some(IconSpec::Classes(vec!["ti-bolt".into()]))
    );
}

#[test]
fn icon_glyph() {
    assert_eq!(IconSpec::parse("🔥"), Some(IconSpec::Glyph("🔥".into())));
    assert_eq!(IconSpec::parse("ti 🔥"), Some(IconSpec::Glyph("ti 🔥".into())));
}

#[test]
fn blank_icon_is_none() {
    assert_eq!(IconSpec::parse(""), None);
    assert_eq!(IconSpec::parse("  "), None);
}
