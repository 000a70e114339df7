//! Resolution of element dimensions into world-space bounds.

use crate::element::{Dimension, Element};
use crate::geometry::{Rect, Size};

/// Resolve an element's world bounds.
///
/// Position is relative to `parent` when given, otherwise to the world origin
/// with percentages taken against `reference` (the viewport size).
pub fn resolve_bounds(element: &Element, parent: Option<&Rect>, reference: Size) -> Rect {
    let container = match parent {
        Some(p) => *p,
        None => Rect::new(0.0, 0.0, reference.width, reference.height),
    };
    let default = element
        .kind
        .default_size()
        .unwrap_or(Size::new(container.width, container.height));

    let width = resolve_length(element.width, container.width, default.width);
    let height = resolve_length(element.height, container.height, default.height);
    let x = container.x + resolve_length(element.x, container.width, 0.0);
    let y = container.y + resolve_length(element.y, container.height, 0.0);

    Rect::new(x, y, width.max(0.0), height.max(0.0))
}

fn resolve_length(dimension: Dimension, extent: f64, auto: f64) -> f64 {
    match dimension {
        Dimension::Px(v) if v.is_finite() => v,
        Dimension::Percent(p) if p.is_finite() => extent * p / 100.0,
        Dimension::Px(_) | Dimension::Percent(_) | Dimension::Auto => auto,
    }
}
