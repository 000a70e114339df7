//! Mapping from element kinds to backend-independent visuals.

use easel_core::{Color, ControlKind, Element, ElementKind, Point, Rect, ShapeKind, Size};

use crate::render_data::{Stroke, Visual};

const CONTROL_FILL: Color = Color::rgb(240, 240, 240);
const CONTROL_BORDER: Color = Color::rgb(160, 160, 160);
const PLACEHOLDER_FILL: Color = Color::rgba(200, 200, 200, 160);
const MEDIA_FILL: Color = Color::rgb(30, 30, 30);
const GRID_FRAME: Color = Color::rgba(120, 120, 200, 180);
const CHECKBOX_SIZE: f64 = 16.0;

/// Build the full-detail visual for an element of the given size.
///
/// The result depends only on the element's appearance, never on the
/// viewport, so it can be cached across pans and zooms.
pub fn build_visual(element: &Element, size: Size) -> Visual {
    let local = Rect::new(0.0, 0.0, size.width, size.height);
    let style = &element.style;
    let stroke = style.border.map(|b| Stroke::solid(b.width, b.color));
    let mut parts = Vec::new();

    if let Some(shadow) = style.shadow {
        parts.push(Visual::Rect {
            bounds: local.translate(shadow.offset_x, shadow.offset_y),
            fill: Some(shadow.color),
            stroke: None,
            corner_radius: style.corner_radius,
        });
    }

    match &element.kind {
        ElementKind::Container => {
            if style.background.is_some() || stroke.is_some() {
                parts.push(Visual::Rect {
                    bounds: local,
                    fill: style.background,
                    stroke,
                    corner_radius: style.corner_radius,
                });
            }
        }
        ElementKind::Text { content, font_size } => {
            if let Some(fill) = style.background {
                parts.push(Visual::filled_rect(local, fill));
            }
            parts.push(Visual::Text {
                bounds: local,
                content: content.clone(),
                font_size: *font_size,
                color: style.text_color,
            });
        }
        ElementKind::Image { source } => {
            parts.push(Visual::Image {
                bounds: local,
                source: source.clone(),
            });
            if let Some(stroke) = stroke {
                parts.push(Visual::outline(local, stroke));
            }
        }
        ElementKind::Video { source } => {
            parts.push(Visual::filled_rect(local, MEDIA_FILL));
            parts.push(Visual::Video {
                bounds: local,
                source: source.clone(),
            });
        }
        ElementKind::Canvas => {
            parts.push(Visual::Canvas { bounds: local });
            if let Some(stroke) = stroke {
                parts.push(Visual::outline(local, stroke));
            }
        }
        ElementKind::Control { control } => {
            parts.extend(control_visual(*control, element, local, stroke));
        }
        ElementKind::Shape { shape } => {
            parts.push(shape_visual(*shape, element, local, stroke));
        }
        ElementKind::Grid => {
            parts.push(Visual::outline(local, Stroke::dashed(1.0, GRID_FRAME)));
        }
        ElementKind::Overlay => {
            if let Some(fill) = style.background {
                parts.push(Visual::filled_rect(local, fill));
            }
        }
    }

    Visual::Group {
        children: parts,
        opacity: style.opacity.clamp(0.0, 1.0),
    }
}

/// Cheap stand-in drawn instead of the full visual.
pub fn lod_visual(element: &Element, size: Size) -> Visual {
    Visual::Placeholder {
        bounds: Rect::new(0.0, 0.0, size.width, size.height),
        color: element.style.background.unwrap_or(PLACEHOLDER_FILL),
    }
}

fn control_visual(
    control: ControlKind,
    element: &Element,
    local: Rect,
    stroke: Option<Stroke>,
) -> Vec<Visual> {
    let style = &element.style;
    let border = stroke.unwrap_or(Stroke::solid(1.0, CONTROL_BORDER));
    let label = |bounds: Rect| Visual::Text {
        bounds,
        content: element.name.clone(),
        font_size: 14.0,
        color: style.text_color,
    };

    match control {
        ControlKind::Button => vec![
            Visual::Rect {
                bounds: local,
                fill: Some(style.background.unwrap_or(CONTROL_FILL)),
                stroke: Some(border),
                corner_radius: style.corner_radius.max(4.0),
            },
            label(local),
        ],
        ControlKind::Input => vec![Visual::Rect {
            bounds: local,
            fill: Some(style.background.unwrap_or(Color::WHITE)),
            stroke: Some(border),
            corner_radius: style.corner_radius,
        }],
        ControlKind::Checkbox => {
            let side = CHECKBOX_SIZE.min(local.height);
            let top = (local.height - side) / 2.0;
            vec![
                Visual::Rect {
                    bounds: Rect::new(0.0, top, side, side),
                    fill: Some(Color::WHITE),
                    stroke: Some(border),
                    corner_radius: 2.0,
                },
                label(Rect::new(
                    side + 6.0,
                    0.0,
                    (local.width - side - 6.0).max(0.0),
                    local.height,
                )),
            ]
        }
        ControlKind::Select => {
            let cx = local.width - 12.0;
            let cy = local.height / 2.0;
            let chevron = Stroke::solid(1.5, border.color);
            vec![
                Visual::Rect {
                    bounds: local,
                    fill: Some(style.background.unwrap_or(Color::WHITE)),
                    stroke: Some(border),
                    corner_radius: style.corner_radius,
                },
                Visual::Line {
                    from: Point::new(cx - 4.0, cy - 2.0),
                    to: Point::new(cx, cy + 2.0),
                    stroke: chevron,
                },
                Visual::Line {
                    from: Point::new(cx, cy + 2.0),
                    to: Point::new(cx + 4.0, cy - 2.0),
                    stroke: chevron,
                },
            ]
        }
    }
}

fn shape_visual(shape: ShapeKind, element: &Element, local: Rect, stroke: Option<Stroke>) -> Visual {
    let style = &element.style;
    match shape {
        ShapeKind::Rectangle => Visual::Rect {
            bounds: local,
            fill: style.background,
            stroke,
            corner_radius: style.corner_radius,
        },
        ShapeKind::Ellipse => Visual::Ellipse {
            bounds: local,
            fill: style.background,
            stroke,
        },
        ShapeKind::Line => Visual::Line {
            from: Point::new(0.0, 0.0),
            to: Point::new(local.width, local.height),
            stroke: stroke.unwrap_or(Stroke::solid(1.0, style.text_color)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Border, Shadow, Style};

    fn children(v: &Visual) -> &[Visual] {
        match v {
            Visual::Group { children, .. } => children,
            _ => panic!("expected group"),
        }
    }

    #[test]
    fn test_text_visual_is_local() {
        let el = Element::new("t", ElementKind::text("Hello")).with_frame(300.0, 400.0, 80.0, 20.0);
        let v = build_visual(&el, Size::new(80.0, 20.0));
        match &children(&v)[0] {
            Visual::Text { bounds, content, .. } => {
                assert_eq!(*bounds, Rect::new(0.0, 0.0, 80.0, 20.0));
                assert_eq!(content, "Hello");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_shadow_is_drawn_first() {
        let el = Element::new("c", ElementKind::Container).with_style(Style {
            background: Some(Color::WHITE),
            border: Some(Border {
                width: 2.0,
                color: Color::BLACK,
            }),
            shadow: Some(Shadow {
                offset_x: 4.0,
                offset_y: 4.0,
                blur: 8.0,
                color: Color::rgba(0, 0, 0, 80),
            }),
            ..Style::default()
        });
        let v = build_visual(&el, Size::new(50.0, 50.0));
        let parts = children(&v);
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], Visual::Rect { bounds, .. } if bounds.x == 4.0));
    }

    #[test]
    fn test_every_kind_produces_a_visual() {
        let kinds = vec![
            ElementKind::Container,
            ElementKind::text("x"),
            ElementKind::image("a.png"),
            ElementKind::video("b.mp4"),
            ElementKind::Canvas,
            ElementKind::Control { control: ControlKind::Button },
            ElementKind::Control { control: ControlKind::Input },
            ElementKind::Control { control: ControlKind::Checkbox },
            ElementKind::Control { control: ControlKind::Select },
            ElementKind::Shape { shape: ShapeKind::Rectangle },
            ElementKind::Shape { shape: ShapeKind::Ellipse },
            ElementKind::Shape { shape: ShapeKind::Line },
            ElementKind::Grid,
            ElementKind::Overlay,
        ];
        for kind in kinds {
            let el = Element::new("k", kind);
            let v = build_visual(&el, Size::new(100.0, 40.0));
            assert!(matches!(v, Visual::Group { .. }));
        }
    }

    #[test]
    fn test_opacity_carried_on_group() {
        let el = Element::new("o", ElementKind::Canvas).with_style(Style {
            opacity: 0.25,
            ..Style::default()
        });
        match build_visual(&el, Size::new(10.0, 10.0)) {
            Visual::Group { opacity, .. } => assert!((opacity - 0.25).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lod_placeholder() {
        let el = Element::new("big", ElementKind::video("v.mp4"));
        let v = lod_visual(&el, Size::new(300.0, 200.0));
        assert!(matches!(v, Visual::Placeholder { .. }));
        assert_eq!(v.primitive_count(), 1);
    }
}
