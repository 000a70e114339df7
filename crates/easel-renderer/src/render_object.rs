use std::cmp::Ordering;

use easel_core::{resolve_bounds, Element, ElementId, ElementKind, Rect, Size};
use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::layer::Layer;

/// Bounds above this area add the large-area surcharge.
pub const LARGE_AREA: f64 = 250_000.0;
/// Bounds above this area add the very-large surcharge.
pub const VERY_LARGE_AREA: f64 = 1_000_000.0;
/// Area beyond which an object counts as complex.
pub const COMPLEX_AREA: f64 = 1_000_000.0;
/// Child count beyond which an object counts as complex.
pub const COMPLEX_CHILD_COUNT: usize = 20;

/// Per-frame renderable wrapper around one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderObject {
    /// Source element.
    pub id: ElementId,
    /// Arena index of the parent object in the same frame, if it was built.
    pub parent: Option<usize>,
    pub bounds: Rect,
    pub layer: Layer,
    pub z_index: i32,
    pub opacity: f64,
    pub rotation: f64,
    pub scale: f64,
    pub has_shadow: bool,
    pub has_filters: bool,
    pub visible: bool,
    pub needs_redraw: bool,
    pub is_cached: bool,
    pub cache_key: Option<CacheKey>,
    pub selected: bool,
    pub hovered: bool,
    pub dragging: bool,
    pub locked: bool,
    pub render_cost: u32,
    pub is_complex: bool,
    /// Set by the optimize phase.
    pub lod: bool,
    /// Set by the optimize phase.
    pub batchable: bool,
}

impl RenderObject {
    /// Build a render object from an element.
    ///
    /// Bounds are resolved against `parent_bounds` when given, otherwise against
    /// the viewport-sized `reference`. No caching or visibility decisions here.
    pub fn create_from_element(
        element: &Element,
        parent_bounds: Option<&Rect>,
        reference: Size,
    ) -> Self {
        let bounds = resolve_bounds(element, parent_bounds, reference);
        let style = &element.style;
        let selected = element.flags.selected;

        let mut object = Self {
            id: element.id,
            parent: None,
            bounds,
            layer: assign_layer(&element.kind, selected),
            z_index: element.z_index,
            opacity: style.opacity.clamp(0.0, 1.0),
            rotation: style.rotation,
            scale: style.scale,
            has_shadow: style.shadow.is_some(),
            has_filters: !style.filters.is_empty(),
            visible: element.is_visible(),
            needs_redraw: true,
            is_cached: false,
            cache_key: None,
            selected,
            hovered: element.flags.hovered,
            dragging: element.flags.dragging,
            locked: element.flags.locked,
            render_cost: 0,
            is_complex: false,
            lod: false,
            batchable: false,
        };
        object.render_cost = estimate_cost(element, &bounds);
        object.is_complex = object.has_shadow
            || object.has_filters
            || object.has_transform()
            || element.child_count() > COMPLEX_CHILD_COUNT
            || bounds.area() > COMPLEX_AREA;
        object
    }

    pub fn has_transform(&self) -> bool {
        self.rotation != 0.0 || self.scale != 1.0
    }

    /// Mark as selected, moving the object to the selection layer.
    pub fn mark_selected(&mut self) {
        self.selected = true;
        self.layer = Layer::Selection;
    }

    /// Largest on-screen extent in pixels at the given zoom.
    pub fn screen_max_dimension(&self, zoom: f64) -> f64 {
        self.bounds.width.max(self.bounds.height) * zoom
    }

    /// Simple objects can share a draw batch.
    pub fn is_batchable(&self) -> bool {
        !self.has_shadow && !self.has_transform() && self.opacity >= 1.0 && !self.has_filters
    }
}

/// Total render order: layer, then z-index, then selected objects last.
pub fn priority_cmp(a: &RenderObject, b: &RenderObject) -> Ordering {
    a.layer
        .cmp(&b.layer)
        .then(a.z_index.cmp(&b.z_index))
        .then(a.selected.cmp(&b.selected))
}

fn assign_layer(kind: &ElementKind, selected: bool) -> Layer {
    if selected {
        return Layer::Selection;
    }
    match kind {
        ElementKind::Grid => Layer::Grid,
        ElementKind::Overlay => Layer::Overlay,
        _ => Layer::Components,
    }
}

fn kind_weight(kind: &ElementKind) -> u32 {
    match kind {
        ElementKind::Image { .. } => 5,
        ElementKind::Video { .. } => 10,
        ElementKind::Canvas => 8,
        ElementKind::Text { .. } => 2,
        ElementKind::Control { .. } => 3,
        ElementKind::Container | ElementKind::Shape { .. } => 1,
        ElementKind::Grid | ElementKind::Overlay => 0,
    }
}

/// Relative cost of drawing an element, used for diagnostics and LOD.
pub fn estimate_cost(element: &Element, bounds: &Rect) -> u32 {
    let style = &element.style;
    let mut cost = 1 + kind_weight(&element.kind);
    if style.shadow.is_some() {
        cost += 3;
    }
    if style.has_partial_opacity() {
        cost += 2;
    }
    if style.rotation != 0.0 {
        cost += 2;
    }
    if style.scale != 1.0 {
        cost += 2;
    }
    cost += u32::try_from(element.child_count()).unwrap_or(u32::MAX);

    let area = bounds.area();
    if area > VERY_LARGE_AREA {
        cost += 5;
    } else if area > LARGE_AREA {
        cost += 3;
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Color, Dimension, Shadow, Style};

    const SCREEN: Size = Size {
        width: 1200.0,
        height: 800.0,
    };

    fn object(layer: Layer, z: i32, selected: bool) -> RenderObject {
        let mut o = RenderObject::create_from_element(
            &Element::new("o", ElementKind::Container).with_frame(0.0, 0.0, 10.0, 10.0),
            None,
            SCREEN,
        );
        o.layer = layer;
        o.z_index = z;
        o.selected = selected;
        o
    }

    #[test]
    fn test_layer_assignment() {
        let plain = Element::new("p", ElementKind::Container);
        let grid = Element::new("g", ElementKind::Grid);
        let overlay = Element::new("o", ElementKind::Overlay);
        let chosen = Element::new("s", ElementKind::image("a.png")).selected();

        assert_eq!(RenderObject::create_from_element(&plain, None, SCREEN).layer, Layer::Components);
        assert_eq!(RenderObject::create_from_element(&grid, None, SCREEN).layer, Layer::Grid);
        assert_eq!(RenderObject::create_from_element(&overlay, None, SCREEN).layer, Layer::Overlay);
        let sel = RenderObject::create_from_element(&chosen, None, SCREEN);
        assert_eq!(sel.layer, Layer::Selection);
        assert!(sel.selected);
    }

    #[test]
    fn test_cost_table() {
        let text = Element::new("t", ElementKind::text("abc")).with_frame(0.0, 0.0, 10.0, 10.0);
        assert_eq!(RenderObject::create_from_element(&text, None, SCREEN).render_cost, 3);

        let video = Element::new("v", ElementKind::video("a.mp4")).with_frame(0.0, 0.0, 10.0, 10.0);
        assert_eq!(RenderObject::create_from_element(&video, None, SCREEN).render_cost, 11);

        let fancy = Element::new("f", ElementKind::image("x.png"))
            .with_frame(0.0, 0.0, 600.0, 600.0)
            .with_style(Style {
                opacity: 0.5,
                rotation: 15.0,
                scale: 2.0,
                shadow: Some(Shadow {
                    offset_x: 2.0,
                    offset_y: 2.0,
                    blur: 4.0,
                    color: Color::BLACK,
                }),
                ..Style::default()
            });
        // 1 + 5 + 3 + 2 + 2 + 2 + large(3)
        let o = RenderObject::create_from_element(&fancy, None, SCREEN);
        assert_eq!(o.render_cost, 18);
        assert!(o.is_complex);
        assert!(!o.is_batchable());

        let huge = Element::new("h", ElementKind::Container).with_frame(0.0, 0.0, 2000.0, 2000.0);
        let o = RenderObject::create_from_element(&huge, None, SCREEN);
        assert_eq!(o.render_cost, 2 + 5);
        assert!(o.is_complex);
    }

    #[test]
    fn test_children_count_toward_cost_and_complexity() {
        let mut parent = Element::new("p", ElementKind::Container).with_frame(0.0, 0.0, 10.0, 10.0);
        parent.children = (0..21).map(|_| uuid_like()).collect();
        let o = RenderObject::create_from_element(&parent, None, SCREEN);
        assert_eq!(o.render_cost, 2 + 21);
        assert!(o.is_complex);
    }

    fn uuid_like() -> ElementId {
        Element::new("c", ElementKind::Container).id
    }

    #[test]
    fn test_parent_relative_bounds() {
        let parent = Rect::new(100.0, 100.0, 200.0, 200.0);
        let child = Element::new("c", ElementKind::Container)
            .with_position(Dimension::Percent(50.0), Dimension::Px(5.0))
            .with_size(Dimension::Px(20.0), Dimension::Auto);
        let o = RenderObject::create_from_element(&child, Some(&parent), SCREEN);
        assert_eq!(o.bounds, Rect::new(200.0, 105.0, 20.0, 200.0));
    }

    #[test]
    fn test_priority_totality() {
        let low_layer_high_z = object(Layer::Components, 1000, true);
        let high_layer_low_z = object(Layer::Selection, -1000, false);
        assert_eq!(priority_cmp(&low_layer_high_z, &high_layer_low_z), Ordering::Less);

        let z1 = object(Layer::Components, 1, false);
        let z2 = object(Layer::Components, 2, false);
        assert_eq!(priority_cmp(&z1, &z2), Ordering::Less);

        let plain = object(Layer::Selection, 0, false);
        let chosen = object(Layer::Selection, 0, true);
        assert_eq!(priority_cmp(&plain, &chosen), Ordering::Less);
    }
}
