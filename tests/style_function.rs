//! End-to-end style function tests: document in, primitives out.

use std::collections::HashMap;

use glam::DVec2;
use glstyle::render::{FillPaint, ImageStyle};
use glstyle::{
    parse_document, Feature, FeatureId, Geometry, GroupKind, SpriteSet, StyleHost, StyleOptions,
};
use serde_json::json;

fn polygon() -> Geometry {
    Geometry::Polygon(vec![vec![
        DVec2::new(0.0, 0.0),
        DVec2::new(10.0, 0.0),
        DVec2::new(10.0, 10.0),
        DVec2::new(0.0, 10.0),
    ]])
}

fn apply(doc: serde_json::Value) -> StyleHost {
    let doc = parse_document(&doc.to_string()).unwrap();
    StyleHost::apply(doc, SpriteSet::new(), StyleOptions::default()).unwrap()
}

fn resolution_for_zoom(options: &StyleOptions, zoom: usize) -> f64 {
    options.resolutions[zoom]
}

#[test]
fn fill_layer_produces_single_red_primitive() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "shapes": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [{
            "id": "poly", "type": "fill", "source": "shapes",
            "filter": ["==", "$type", "Polygon"],
            "paint": {"fill-color": "#ff0000", "fill-opacity": 0.5}
        }]
    }));

    let group = host.group_for_layer("poly").unwrap();
    let feature = Feature::new(polygon());
    let resolution = resolution_for_zoom(&StyleOptions::default(), 10);

    let styles = group.style(&feature, resolution, None).unwrap();
    assert_eq!(styles.len(), 1);
    match &styles[0].fill.as_ref().unwrap().paint {
        FillPaint::Color(color) => assert_eq!(color, "rgba(255,0,0,0.5)"),
        _ => panic!("expected flat fill color"),
    }

    // The $type filter hides point features.
    let point = Feature::new(Geometry::Point(DVec2::ZERO));
    assert!(group.style(&point, resolution, None).is_none());
}

#[test]
fn consecutive_source_runs_compile_into_two_groups() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "a": {"type": "vector", "tiles": ["http://a/{z}/{x}/{y}.pbf"]},
            "b": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [
            {"id": "one", "type": "fill", "source": "a", "source-layer": "w"},
            {"id": "two", "type": "line", "source": "a", "source-layer": "w",
             "paint": {"line-color": "#fff", "line-width": 1}},
            {"id": "three", "type": "circle", "source": "b"}
        ]
    }));

    let host_layers = host.host_layers();
    assert_eq!(host_layers.len(), 2);
    assert_eq!(host_layers[0].kind, GroupKind::Styled);
    assert_eq!(host_layers[0].source_id, "a");
    assert_eq!(host_layers[0].layer_ids, vec!["one", "two"]);
    assert_eq!(host_layers[1].layer_ids, vec!["three"]);
}

#[test]
fn z_index_is_position_within_group() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "s": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [
            {"id": "base", "type": "fill", "source": "s",
             "paint": {"fill-color": "#112233"}},
            {"id": "outline", "type": "line", "source": "s",
             "paint": {"line-color": "#445566", "line-width": 2}}
        ]
    }));

    let group = host.group_for_layer("base").unwrap();
    let feature = Feature::new(polygon());
    let resolution = resolution_for_zoom(&StyleOptions::default(), 5);
    let styles = group.style(&feature, resolution, None).unwrap();
    assert_eq!(styles.len(), 2);
    assert_eq!(styles[0].z_index, 0);
    assert_eq!(styles[1].z_index, 1);
}

#[test]
fn only_layer_restricts_evaluation() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "s": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [
            {"id": "base", "type": "fill", "source": "s",
             "paint": {"fill-color": "#112233"}},
            {"id": "outline", "type": "line", "source": "s",
             "paint": {"line-color": "#445566", "line-width": 2}}
        ]
    }));

    let group = host.group_for_layer("base").unwrap();
    let feature = Feature::new(polygon());
    let resolution = resolution_for_zoom(&StyleOptions::default(), 5);

    let styles = group.style(&feature, resolution, Some("outline")).unwrap();
    assert_eq!(styles.len(), 1);
    assert!(styles[0].stroke.is_some());
    assert!(styles[0].fill.is_none());
}

#[test]
fn zoom_window_is_half_open() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "s": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [{
            "id": "mid", "type": "fill", "source": "s",
            "minzoom": 5, "maxzoom": 10,
            "paint": {"fill-color": "#ff0000"}
        }]
    }));

    let group = host.group_for_layer("mid").unwrap();
    let feature = Feature::new(polygon());
    let options = StyleOptions::default();

    assert!(group
        .style(&feature, resolution_for_zoom(&options, 4), None)
        .is_none());
    assert!(group
        .style(&feature, resolution_for_zoom(&options, 5), None)
        .is_some());
    assert!(group
        .style(&feature, resolution_for_zoom(&options, 9), None)
        .is_some());
    // maxzoom is exclusive.
    assert!(group
        .style(&feature, resolution_for_zoom(&options, 10), None)
        .is_none());
}

#[test]
fn geometry_collection_explodes_into_children() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "s": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [
            {"id": "polys", "type": "fill", "source": "s",
             "filter": ["==", "$type", "Polygon"],
             "paint": {"fill-color": "#ff0000"}},
            {"id": "pts", "type": "circle", "source": "s",
             "filter": ["==", "$type", "Point"],
             "paint": {"circle-color": "#00ff00"}}
        ]
    }));

    let group = host.group_for_layer("polys").unwrap();
    let collection = Feature::new(Geometry::Collection(vec![
        polygon(),
        Geometry::Point(DVec2::new(1.0, 1.0)),
    ]));
    let resolution = resolution_for_zoom(&StyleOptions::default(), 8);

    let styles = group.style(&collection, resolution, None).unwrap();
    // One fill from the polygon child, one circle from the point child.
    assert_eq!(styles.len(), 2);
    assert!(styles[0].fill.is_some());
    assert!(matches!(
        styles[1].image.as_ref().unwrap(),
        ImageStyle::Circle(_)
    ));
}

#[test]
fn feature_state_drives_expressions() {
    let mut host = apply(json!({
        "version": 8,
        "sources": {
            "s": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [{
            "id": "hoverable", "type": "fill", "source": "s",
            "paint": {
                "fill-color": ["case",
                    ["to-boolean", ["feature-state", "hover"]], "#ff0000",
                    "#0000ff"
                ]
            }
        }]
    }));

    let feature = Feature::new(polygon()).with_id(FeatureId::Number(42));
    let resolution = resolution_for_zoom(&StyleOptions::default(), 8);
    let group = host.group_for_layer("hoverable").unwrap();

    let styles = group.style(&feature, resolution, None).unwrap();
    match &styles[0].fill.as_ref().unwrap().paint {
        FillPaint::Color(c) => assert_eq!(c, "rgba(0,0,255,1)"),
        _ => panic!("expected color"),
    }

    let mut state = serde_json::Map::new();
    state.insert("hover".to_string(), json!(true));
    host.set_feature_state("s", FeatureId::Number(42), Some(state))
        .unwrap();

    let styles = group.style(&feature, resolution, None).unwrap();
    match &styles[0].fill.as_ref().unwrap().paint {
        FillPaint::Color(c) => assert_eq!(c, "rgba(255,0,0,1)"),
        _ => panic!("expected color"),
    }
}

#[test]
fn label_layer_wraps_and_colors_text() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "s": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
        },
        "layers": [{
            "id": "labels", "type": "symbol", "source": "s",
            "layout": {
                "text-field": "{name}",
                "text-size": 10,
                "text-max-width": 10
            },
            "paint": {"text-color": "#333333"}
        }]
    }));

    let group = host.group_for_layer("labels").unwrap();
    let feature = Feature::new(Geometry::Point(DVec2::ZERO))
        .with_property("name", json!("Verylongtext i i longtext short Shor T i i"));
    let resolution = resolution_for_zoom(&StyleOptions::default(), 8);

    let styles = group.style(&feature, resolution, None).unwrap();
    let text = styles[0].text.as_ref().unwrap();
    assert_eq!(text.content, "Verylongtext i i\nlongtext short\nShor T i i");
    assert_eq!(text.fill_color.as_deref(), Some("rgba(51,51,51,1)"));
}

#[test]
fn unstyled_source_layer_draws_nothing() {
    let host = apply(json!({
        "version": 8,
        "sources": {
            "v": {"type": "vector", "tiles": ["http://v/{z}/{x}/{y}.pbf"]}
        },
        "layers": [{
            "id": "roads", "type": "line", "source": "v", "source-layer": "road",
            "paint": {"line-color": "#fff", "line-width": 1}
        }]
    }));

    let group = host.group_for_layer("roads").unwrap();
    let resolution = resolution_for_zoom(&StyleOptions::default(), 8);

    let road = Feature::new(Geometry::LineString(vec![DVec2::ZERO, DVec2::X]))
        .with_source_layer("road");
    assert!(group.style(&road, resolution, None).is_some());

    let water = Feature::new(Geometry::LineString(vec![DVec2::ZERO, DVec2::X]))
        .with_source_layer("water");
    assert!(group.style(&water, resolution, None).is_none());
}
