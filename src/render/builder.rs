//! Per-layer style resolution: fill, line and circle handlers, plus the
//! dispatch entry the compiled group calls for every candidate layer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::color::color_with_opacity;
use crate::expr::{EvalContext, ExprCache};
use crate::feature::Feature;
use crate::render::pool::StylePool;
use crate::render::primitives::{
    CircleStyle, DeclutterMode, FillPaint, FillStyle, ImageStyle, LineCap, LineJoin,
    RenderableStyle, StrokeStyle,
};
use crate::render::props::{Bag, PropReader};
use crate::render::symbol;
use crate::render::StyleOptions;
use crate::spec::{LayerType, StyleLayer};
use crate::sprite::{IconCache, SpriteSet};
use crate::text::{FontResolver, TextMeasurer, WrapCache};

/// Cache key for resolved circle sub-objects. Circles have no per-feature
/// geometry dependency beyond position, so equal tuples share one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CircleKey {
    radius_bits: u64,
    fill: Option<String>,
    stroke: Option<String>,
    stroke_width_bits: u64,
    translate_bits: [u64; 2],
}

/// Everything the per-layer handlers read, bundled to keep signatures flat.
pub struct BuildInputs<'a> {
    pub expr_cache: &'a RefCell<ExprCache>,
    pub icon_cache: &'a RefCell<IconCache>,
    pub wrap_cache: &'a RefCell<WrapCache>,
    pub circle_cache: &'a RefCell<HashMap<CircleKey, Rc<CircleStyle>>>,
    pub sprites: &'a SpriteSet,
    pub options: &'a StyleOptions,
    pub measurer: &'a dyn TextMeasurer,
    pub fonts: &'a dyn FontResolver,
}

/// Resolve one passing layer into zero or more primitives, emitted in order.
#[allow(clippy::too_many_arguments)]
pub fn build_layer_style(
    layer: &StyleLayer,
    layer_type: LayerType,
    z_index: i32,
    feature: &Feature,
    resolution: f64,
    ctx: &EvalContext,
    inputs: &BuildInputs,
    pool: &mut StylePool,
) {
    let reader = PropReader::new(layer, inputs.expr_cache, ctx);
    match layer_type {
        LayerType::Fill => build_fill(&reader, false, z_index, inputs, pool),
        LayerType::FillExtrusion => build_fill(&reader, true, z_index, inputs, pool),
        LayerType::Line => build_line(&reader, z_index, inputs, pool),
        LayerType::Circle => build_circle(&reader, z_index, inputs, pool),
        LayerType::Symbol => {
            symbol::build_icon(&reader, z_index, feature, resolution, inputs, pool);
            symbol::build_text(&reader, z_index, feature, inputs, pool);
        }
        // Background, raster and hillshade never reach the shared style
        // function; heatmap is dropped at grouping time.
        _ => {}
    }
}

fn build_fill(
    reader: &PropReader,
    extrusion: bool,
    z_index: i32,
    inputs: &BuildInputs,
    pool: &mut StylePool,
) {
    let (opacity_prop, color_prop, pattern_prop) = if extrusion {
        (
            "fill-extrusion-opacity",
            "fill-extrusion-color",
            "fill-extrusion-pattern",
        )
    } else {
        ("fill-opacity", "fill-color", "fill-pattern")
    };
    let opacity = reader.number(Bag::Paint, opacity_prop);
    let color = reader.color(Bag::Paint, color_prop);
    let render_transparent = inputs.options.render_transparent;

    let paint = match reader.opt_string(Bag::Paint, pattern_prop) {
        Some(icon) => inputs
            .icon_cache
            .borrow_mut()
            .pattern(inputs.sprites, &icon, opacity)
            .map(FillPaint::Pattern),
        None => {
            color_with_opacity(color, opacity, render_transparent).map(FillPaint::Color)
        }
    };

    // Outline defaults to the fill color; extrusions darken it with height
    // to fake depth shading.
    let outline = if extrusion {
        let height = reader.number(Bag::Paint, "fill-extrusion-height");
        let darken = (0.9 - height.min(225.0) / 280.0).max(0.1);
        color.map(|c| c.darken(darken))
    } else {
        reader.color(Bag::Paint, "fill-outline-color").or(color)
    };
    let outline = color_with_opacity(outline, opacity, render_transparent);

    if paint.is_none() && outline.is_none() {
        return;
    }

    pool.emit(RenderableStyle {
        z_index,
        fill: paint.map(|paint| FillStyle { paint }),
        stroke: outline.map(|color| StrokeStyle {
            color,
            width: 1.0,
            cap: LineCap::default(),
            join: LineJoin::default(),
            miter_limit: 2.0,
            dash: None,
        }),
        image: None,
        text: None,
    });
}

fn build_line(reader: &PropReader, z_index: i32, inputs: &BuildInputs, pool: &mut StylePool) {
    // Pattern lines are not filled with a color.
    if reader.opt_string(Bag::Paint, "line-pattern").is_some() {
        return;
    }

    let color = color_with_opacity(
        reader.color(Bag::Paint, "line-color"),
        reader.number(Bag::Paint, "line-opacity"),
        inputs.options.render_transparent,
    );
    let width = reader.number(Bag::Paint, "line-width");
    let (Some(color), true) = (color, width > 0.0) else {
        return;
    };

    let dash = reader
        .number_array(Bag::Paint, "line-dasharray")
        .map(|dashes| dashes.iter().map(|d| d * width).collect());

    pool.emit(RenderableStyle {
        z_index,
        fill: None,
        stroke: Some(StrokeStyle {
            color,
            width,
            cap: LineCap::parse(&reader.string(Bag::Layout, "line-cap")),
            join: LineJoin::parse(&reader.string(Bag::Layout, "line-join")),
            miter_limit: reader.number(Bag::Layout, "line-miter-limit"),
            dash,
        }),
        image: None,
        text: None,
    });
}

fn build_circle(reader: &PropReader, z_index: i32, inputs: &BuildInputs, pool: &mut StylePool) {
    let render_transparent = inputs.options.render_transparent;
    let radius = reader.number(Bag::Paint, "circle-radius");
    let fill = color_with_opacity(
        reader.color(Bag::Paint, "circle-color"),
        reader.number(Bag::Paint, "circle-opacity"),
        render_transparent,
    );
    let stroke_width = reader.number(Bag::Paint, "circle-stroke-width");
    let stroke = color_with_opacity(
        reader.color(Bag::Paint, "circle-stroke-color"),
        reader.number(Bag::Paint, "circle-stroke-opacity"),
        render_transparent,
    );
    let translate = reader
        .number_array(Bag::Paint, "circle-translate")
        .filter(|t| t.len() >= 2)
        .map(|t| [t[0], t[1]])
        .unwrap_or([0.0, 0.0]);

    if fill.is_none() && (stroke.is_none() || stroke_width <= 0.0) {
        return;
    }

    let key = CircleKey {
        radius_bits: radius.to_bits(),
        fill: fill.clone(),
        stroke: stroke.clone(),
        stroke_width_bits: stroke_width.to_bits(),
        translate_bits: [translate[0].to_bits(), translate[1].to_bits()],
    };
    let circle = {
        let mut cache = inputs.circle_cache.borrow_mut();
        match cache.get(&key) {
            Some(hit) => hit.clone(),
            None => {
                let built = Rc::new(CircleStyle {
                    radius,
                    fill_color: fill,
                    stroke_color: stroke,
                    stroke_width,
                    displacement: translate,
                    declutter_mode: DeclutterMode::None,
                });
                cache.insert(key, built.clone());
                built
            }
        }
    };

    pool.emit(RenderableStyle {
        z_index,
        fill: None,
        stroke: None,
        image: Some(ImageStyle::Circle(circle)),
        text: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::SpriteSet;
    use crate::text::{ApproxMeasurer, SystemFontResolver};
    use serde_json::json;

    struct Fixture {
        expr_cache: RefCell<ExprCache>,
        icon_cache: RefCell<IconCache>,
        wrap_cache: RefCell<WrapCache>,
        circle_cache: RefCell<HashMap<CircleKey, Rc<CircleStyle>>>,
        sprites: SpriteSet,
        options: StyleOptions,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                expr_cache: RefCell::new(ExprCache::new()),
                icon_cache: RefCell::new(IconCache::new()),
                wrap_cache: RefCell::new(WrapCache::new()),
                circle_cache: RefCell::new(HashMap::new()),
                sprites: SpriteSet::new(),
                options: StyleOptions::default(),
            }
        }

        fn inputs(&self) -> BuildInputs<'_> {
            BuildInputs {
                expr_cache: &self.expr_cache,
                icon_cache: &self.icon_cache,
                wrap_cache: &self.wrap_cache,
                circle_cache: &self.circle_cache,
                sprites: &self.sprites,
                options: &self.options,
                measurer: &ApproxMeasurer,
                fonts: &SystemFontResolver,
            }
        }
    }

    fn layer_from(value: serde_json::Value) -> StyleLayer {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fill_color_and_opacity() {
        let fixture = Fixture::new();
        let layer = layer_from(json!({
            "id": "water", "type": "fill", "source": "s",
            "paint": {"fill-color": "#ff0000", "fill-opacity": 0.5}
        }));
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 10.0);
        let reader = PropReader::new(&layer, &fixture.expr_cache, &ctx);
        let mut pool = StylePool::new();
        pool.begin();
        build_fill(&reader, false, 0, &fixture.inputs(), &mut pool);
        let styles = pool.finish();
        assert_eq!(styles.len(), 1);
        match &styles[0].fill.as_ref().unwrap().paint {
            FillPaint::Color(c) => assert_eq!(c, "rgba(255,0,0,0.5)"),
            _ => panic!("expected flat color"),
        }
        // Outline defaults to the fill color.
        assert_eq!(styles[0].stroke.as_ref().unwrap().color, "rgba(255,0,0,0.5)");
    }

    #[test]
    fn test_extrusion_outline_darkens_with_height() {
        let fixture = Fixture::new();
        let layer = layer_from(json!({
            "id": "b", "type": "fill-extrusion", "source": "s",
            "paint": {"fill-extrusion-color": "#ffffff", "fill-extrusion-height": 280.0}
        }));
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 10.0);
        let reader = PropReader::new(&layer, &fixture.expr_cache, &ctx);
        let mut pool = StylePool::new();
        pool.begin();
        build_fill(&reader, true, 0, &fixture.inputs(), &mut pool);
        let styles = pool.finish();
        // Height clamps at 225: factor = max(0.1, 0.9 - 225/280) ≈ 0.09643 → 0.1.
        let stroke = styles[0].stroke.as_ref().unwrap();
        assert_eq!(stroke.color, "rgba(26,26,26,1)");
    }

    #[test]
    fn test_line_requires_width_and_color() {
        let fixture = Fixture::new();
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 10.0);
        let mut pool = StylePool::new();

        let zero_width = layer_from(json!({
            "id": "l", "type": "line", "source": "s",
            "paint": {"line-color": "#fff", "line-width": 0}
        }));
        let reader = PropReader::new(&zero_width, &fixture.expr_cache, &ctx);
        pool.begin();
        build_line(&reader, 0, &fixture.inputs(), &mut pool);
        assert!(pool.finish().is_empty());

        let transparent = layer_from(json!({
            "id": "l2", "type": "line", "source": "s",
            "paint": {"line-color": "#fff", "line-width": 2, "line-opacity": 0}
        }));
        let reader = PropReader::new(&transparent, &fixture.expr_cache, &ctx);
        pool.begin();
        build_line(&reader, 0, &fixture.inputs(), &mut pool);
        assert!(pool.finish().is_empty());
    }

    #[test]
    fn test_line_dash_scales_with_width() {
        let fixture = Fixture::new();
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 10.0);
        let layer = layer_from(json!({
            "id": "l", "type": "line", "source": "s",
            "paint": {"line-color": "#fff", "line-width": 4, "line-dasharray": [2, 1]}
        }));
        let reader = PropReader::new(&layer, &fixture.expr_cache, &ctx);
        let mut pool = StylePool::new();
        pool.begin();
        build_line(&reader, 0, &fixture.inputs(), &mut pool);
        let styles = pool.finish();
        let stroke = styles[0].stroke.as_ref().unwrap();
        assert_eq!(stroke.dash.as_deref(), Some(&[8.0, 4.0][..]));
    }

    #[test]
    fn test_circle_cache_shares_equal_tuples() {
        let fixture = Fixture::new();
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 10.0);
        let layer = layer_from(json!({
            "id": "c", "type": "circle", "source": "s",
            "paint": {"circle-color": "#123456"}
        }));
        let reader = PropReader::new(&layer, &fixture.expr_cache, &ctx);
        let mut pool = StylePool::new();

        pool.begin();
        build_circle(&reader, 0, &fixture.inputs(), &mut pool);
        let first = pool.finish();
        pool.begin();
        build_circle(&reader, 0, &fixture.inputs(), &mut pool);
        let second = pool.finish();

        let circle_of = |styles: &[Rc<RenderableStyle>]| match styles[0].image.as_ref().unwrap() {
            ImageStyle::Circle(c) => c.clone(),
            _ => panic!("expected circle"),
        };
        assert!(Rc::ptr_eq(&circle_of(&first), &circle_of(&second)));
        assert_eq!(circle_of(&first).radius, 5.0);
        assert_eq!(fixture.circle_cache.borrow().len(), 1);
    }
}
