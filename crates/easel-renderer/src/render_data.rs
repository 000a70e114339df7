use easel_core::{Color, ElementId, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::layer::Layer;
use crate::viewport::{ViewportBounds, ViewportTransform};

/// Rough memory footprint of a produced visual.
pub trait EstimateSize {
    fn estimated_bytes(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub width: f64,
    pub color: Color,
    pub dashed: bool,
}

impl Stroke {
    pub fn solid(width: f64, color: Color) -> Self {
        Self {
            width,
            color,
            dashed: false,
        }
    }

    pub fn dashed(width: f64, color: Color) -> Self {
        Self {
            width,
            color,
            dashed: true,
        }
    }
}

/// Backend-independent drawing primitive.
///
/// Element visuals are expressed in local coordinates (origin at the object's
/// top-left) so they stay valid while the element moves or the view pans.
/// Overlay visuals are in screen pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Visual {
    Rect {
        bounds: Rect,
        fill: Option<Color>,
        stroke: Option<Stroke>,
        corner_radius: f64,
    },
    Ellipse {
        bounds: Rect,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Line {
        from: Point,
        to: Point,
        stroke: Stroke,
    },
    Text {
        bounds: Rect,
        content: String,
        font_size: f64,
        color: Color,
    },
    Image {
        bounds: Rect,
        source: String,
    },
    Video {
        bounds: Rect,
        source: String,
    },
    Canvas {
        bounds: Rect,
    },
    /// Cheap stand-in used for level-of-detail rendering.
    Placeholder {
        bounds: Rect,
        color: Color,
    },
    Group {
        children: Vec<Visual>,
        opacity: f64,
    },
}

impl Visual {
    pub fn group(children: Vec<Visual>) -> Self {
        Visual::Group {
            children,
            opacity: 1.0,
        }
    }

    pub fn filled_rect(bounds: Rect, fill: Color) -> Self {
        Visual::Rect {
            bounds,
            fill: Some(fill),
            stroke: None,
            corner_radius: 0.0,
        }
    }

    pub fn outline(bounds: Rect, stroke: Stroke) -> Self {
        Visual::Rect {
            bounds,
            fill: None,
            stroke: Some(stroke),
            corner_radius: 0.0,
        }
    }

    /// Number of leaf primitives.
    pub fn primitive_count(&self) -> usize {
        match self {
            Visual::Group { children, .. } => children.iter().map(Visual::primitive_count).sum(),
            _ => 1,
        }
    }
}

impl EstimateSize for Visual {
    fn estimated_bytes(&self) -> usize {
        match self {
            Visual::Text { content, .. } => 64 + content.len() * 2,
            Visual::Group { children, .. } => {
                64 + children.iter().map(EstimateSize::estimated_bytes).sum::<usize>()
            }
            Visual::Rect { .. } | Visual::Ellipse { .. } => 96,
            Visual::Line { .. } => 64,
            Visual::Placeholder { .. } => 48,
            Visual::Image { .. } => 256 * 1024,
            Visual::Canvas { .. } => 512 * 1024,
            Visual::Video { .. } => 1024 * 1024,
        }
    }
}

/// One element's visual placed in world space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub element: ElementId,
    /// World bounds the local visual is mapped into.
    pub bounds: Rect,
    pub z_index: i32,
    pub opacity: f64,
    pub rotation: f64,
    pub scale: f64,
    pub visual: Visual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayLayer {
    pub layer: Layer,
    pub items: Vec<DisplayItem>,
}

/// Composed visual description of one frame, sent to the host display layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayList {
    pub layers: Vec<DisplayLayer>,
    pub viewport: ViewportBounds,
    pub transform: ViewportTransform,
}

impl DisplayList {
    pub fn empty(viewport: ViewportBounds, transform: ViewportTransform) -> Self {
        Self {
            layers: Vec::new(),
            viewport,
            transform,
        }
    }

    pub fn item_count(&self) -> usize {
        self.layers.iter().map(|l| l.items.len()).sum()
    }

    /// Items in paint order.
    pub fn items(&self) -> impl Iterator<Item = &DisplayItem> {
        self.layers.iter().flat_map(|l| l.items.iter())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
