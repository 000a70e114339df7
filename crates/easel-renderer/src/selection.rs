//! Selection overlay: outline, resize handles, rotation handle and the drag
//! math that turns pointer movement into new bounds or angles.
//!
//! Overlay geometry is in screen pixels so handles keep a constant size at
//! every zoom level. Drag updates work in world units.

use easel_core::{Color, Element, ElementId, HandleMask, Point, Rect, Size};
use serde::{Deserialize, Serialize};

use crate::render_data::{Stroke, Visual};
use crate::viewport::ViewportManager;

/// Extra pixels around a handle that still count as a hit.
const HIT_SLOP: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub outline_color: Color,
    pub handle_fill: Color,
    /// Handle side length in pixels.
    pub handle_size: f64,
    /// Distance of the rotation handle above the outline, in pixels.
    pub rotation_handle_offset: f64,
    pub show_dimensions: bool,
    /// The dimension label is hidden below this on-screen size.
    pub min_label_size: f64,
    /// Rotation snapping step in degrees.
    pub snap_angle: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            outline_color: Color::rgb(24, 119, 242),
            handle_fill: Color::WHITE,
            handle_size: 8.0,
            rotation_handle_offset: 24.0,
            show_dimensions: true,
            min_label_size: 40.0,
            snap_angle: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlePosition {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl HandlePosition {
    pub const ALL: [HandlePosition; 8] = [
        HandlePosition::North,
        HandlePosition::NorthEast,
        HandlePosition::East,
        HandlePosition::SouthEast,
        HandlePosition::South,
        HandlePosition::SouthWest,
        HandlePosition::West,
        HandlePosition::NorthWest,
    ];

    pub fn mask(&self) -> HandleMask {
        match self {
            HandlePosition::North => HandleMask::NORTH,
            HandlePosition::NorthEast => HandleMask::NORTH_EAST,
            HandlePosition::East => HandleMask::EAST,
            HandlePosition::SouthEast => HandleMask::SOUTH_EAST,
            HandlePosition::South => HandleMask::SOUTH,
            HandlePosition::SouthWest => HandleMask::SOUTH_WEST,
            HandlePosition::West => HandleMask::WEST,
            HandlePosition::NorthWest => HandleMask::NORTH_WEST,
        }
    }

    pub fn is_corner(&self) -> bool {
        HandleMask::CORNERS.contains(self.mask())
    }

    /// Horizontal edge moved by this handle: -1 west, 1 east, 0 none.
    fn x_edge(&self) -> i8 {
        match self {
            HandlePosition::West | HandlePosition::NorthWest | HandlePosition::SouthWest => -1,
            HandlePosition::East | HandlePosition::NorthEast | HandlePosition::SouthEast => 1,
            HandlePosition::North | HandlePosition::South => 0,
        }
    }

    /// Vertical edge moved by this handle: -1 north, 1 south, 0 none.
    fn y_edge(&self) -> i8 {
        match self {
            HandlePosition::North | HandlePosition::NorthEast | HandlePosition::NorthWest => -1,
            HandlePosition::South | HandlePosition::SouthEast | HandlePosition::SouthWest => 1,
            HandlePosition::East | HandlePosition::West => 0,
        }
    }

    /// Where this handle sits on `rect`.
    pub fn anchor(&self, rect: &Rect) -> Point {
        let x = match self.x_edge() {
            -1 => rect.x,
            1 => rect.right(),
            _ => rect.x + rect.width / 2.0,
        };
        let y = match self.y_edge() {
            -1 => rect.y,
            1 => rect.bottom(),
            _ => rect.y + rect.height / 2.0,
        };
        Point::new(x, y)
    }
}

/// A selected element as seen by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionTarget {
    pub id: ElementId,
    /// World bounds.
    pub bounds: Rect,
    pub handles: HandleMask,
    pub rotatable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandleRect {
    pub position: HandlePosition,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleHit {
    Resize(HandlePosition),
    Rotate,
}

/// Screen-space selection chrome for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOverlay {
    pub outline: Rect,
    pub handles: Vec<HandleRect>,
    pub rotation_handle: Option<Point>,
    /// Width x height in world units.
    pub dimension_label: Option<String>,
    /// "N selected" for multi-selection.
    pub badge: Option<String>,
    pub count: usize,
    handle_size: f64,
}

impl SelectionOverlay {
    pub fn is_multi(&self) -> bool {
        self.count > 1
    }

    /// Hit-test a screen point against the handles, rotation handle first.
    pub fn handle_at(&self, point: Point) -> Option<HandleHit> {
        if let Some(center) = self.rotation_handle {
            if center.distance_to(&point) <= self.handle_size / 2.0 + HIT_SLOP {
                return Some(HandleHit::Rotate);
            }
        }
        self.handles
            .iter()
            .find(|h| h.rect.expand(HIT_SLOP).contains_point(&point))
            .map(|h| HandleHit::Resize(h.position))
    }

    pub fn to_visuals(&self, config: &SelectionConfig) -> Vec<Visual> {
        let outline_stroke = if self.is_multi() {
            Stroke::dashed(1.0, config.outline_color)
        } else {
            Stroke::solid(1.0, config.outline_color)
        };
        let mut out = vec![Visual::outline(self.outline, outline_stroke)];

        if let Some(center) = self.rotation_handle {
            let top = HandlePosition::North.anchor(&self.outline);
            out.push(Visual::Line {
                from: top,
                to: center,
                stroke: Stroke::solid(1.0, config.outline_color),
            });
            let r = self.handle_size / 2.0;
            out.push(Visual::Ellipse {
                bounds: Rect::new(center.x - r, center.y - r, self.handle_size, self.handle_size),
                fill: Some(config.handle_fill),
                stroke: Some(Stroke::solid(1.0, config.outline_color)),
            });
        }

        for handle in &self.handles {
            out.push(Visual::Rect {
                bounds: handle.rect,
                fill: Some(config.handle_fill),
                stroke: Some(Stroke::solid(1.0, config.outline_color)),
                corner_radius: 0.0,
            });
        }

        let caption = |content: &String, bounds: Rect| Visual::Text {
            bounds,
            content: content.clone(),
            font_size: 11.0,
            color: config.outline_color,
        };
        if let Some(label) = &self.dimension_label {
            let below = Rect::new(self.outline.x, self.outline.bottom() + 6.0, self.outline.width, 16.0);
            out.push(caption(label, below));
        }
        if let Some(badge) = &self.badge {
            let above = Rect::new(self.outline.x, self.outline.y - 22.0, self.outline.width, 16.0);
            out.push(caption(badge, above));
        }
        out
    }
}

/// Builds selection overlays from the current selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionRenderer {
    config: SelectionConfig,
}

impl SelectionRenderer {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Overlay for the selection, or `None` when nothing is selected.
    pub fn render(
        &self,
        targets: &[SelectionTarget],
        viewport: &ViewportManager,
    ) -> Option<SelectionOverlay> {
        match targets {
            [] => None,
            [single] => Some(self.single(single, viewport)),
            many => self.multi(many, viewport),
        }
    }

    fn single(&self, target: &SelectionTarget, viewport: &ViewportManager) -> SelectionOverlay {
        let outline = viewport.world_rect_to_screen(&target.bounds);
        let labelled = self.config.show_dimensions
            && outline.width >= self.config.min_label_size
            && outline.height >= self.config.min_label_size;

        SelectionOverlay {
            outline,
            handles: self.handles(&outline, target.handles),
            rotation_handle: target.rotatable.then(|| {
                let top = HandlePosition::North.anchor(&outline);
                top.translate(0.0, -self.config.rotation_handle_offset)
            }),
            dimension_label: labelled.then(|| {
                format!(
                    "{} \u{d7} {}",
                    target.bounds.width.round(),
                    target.bounds.height.round()
                )
            }),
            badge: None,
            count: 1,
            handle_size: self.config.handle_size,
        }
    }

    fn multi(&self, targets: &[SelectionTarget], viewport: &ViewportManager) -> Option<SelectionOverlay> {
        let union = Rect::union_all(targets.iter().map(|t| &t.bounds))?;
        let outline = viewport.world_rect_to_screen(&union);
        Some(SelectionOverlay {
            outline,
            handles: self.handles(&outline, HandleMask::CORNERS),
            rotation_handle: None,
            dimension_label: None,
            badge: Some(format!("{} selected", targets.len())),
            count: targets.len(),
            handle_size: self.config.handle_size,
        })
    }

    /// Start resizing `element` from `handle`, honouring its minimum size.
    ///
    /// `None` when the element is locked or the handle is disabled for it.
    pub fn begin_resize(
        &self,
        element: &Element,
        bounds: Rect,
        handle: HandlePosition,
    ) -> Option<ResizeDrag> {
        let constraints = &element.constraints;
        if element.flags.locked || !constraints.resize_handles.contains(handle.mask()) {
            return None;
        }
        Some(ResizeDrag::new(
            handle,
            bounds,
            Size::new(constraints.min_width, constraints.min_height),
        ))
    }

    /// Start rotating `element` about its center, snapping to the configured step.
    pub fn begin_rotation(&self, element: &Element, bounds: Rect, pointer: Point) -> Option<RotationDrag> {
        if element.flags.locked || !element.constraints.rotatable {
            return None;
        }
        Some(
            RotationDrag::begin(bounds.center(), pointer, element.style.rotation)
                .with_snap(self.config.snap_angle),
        )
    }

    fn handles(&self, outline: &Rect, mask: HandleMask) -> Vec<HandleRect> {
        let size = self.config.handle_size;
        HandlePosition::ALL
            .iter()
            .filter(|p| mask.contains(p.mask()))
            .map(|&position| {
                let at = position.anchor(outline);
                HandleRect {
                    position,
                    rect: Rect::new(at.x - size / 2.0, at.y - size / 2.0, size, size),
                }
            })
            .collect()
    }
}

/// Resize in progress from one handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeDrag {
    handle: HandlePosition,
    start: Rect,
    min_size: Size,
}

impl ResizeDrag {
    pub fn new(handle: HandlePosition, start_bounds: Rect, min_size: Size) -> Self {
        Self {
            handle,
            start: start_bounds,
            min_size: Size::new(min_size.width.max(0.0), min_size.height.max(0.0)),
        }
    }

    pub fn handle(&self) -> HandlePosition {
        self.handle
    }

    /// New world bounds for a total pointer delta since the drag began.
    ///
    /// The edge opposite the handle stays fixed; at the minimum size the moved
    /// edge stops instead of crossing it.
    pub fn update(&self, dx: f64, dy: f64) -> Rect {
        let (x, width) = resize_axis(
            self.start.x,
            self.start.width,
            dx,
            self.handle.x_edge(),
            self.min_size.width,
        );
        let (y, height) = resize_axis(
            self.start.y,
            self.start.height,
            dy,
            self.handle.y_edge(),
            self.min_size.height,
        );
        Rect::new(x, y, width, height)
    }
}

fn resize_axis(origin: f64, extent: f64, delta: f64, edge: i8, min: f64) -> (f64, f64) {
    match edge {
        -1 => {
            let resized = (extent - delta).max(min);
            (origin + extent - resized, resized)
        }
        1 => (origin, (extent + delta).max(min)),
        _ => (origin, extent),
    }
}

/// Rotation in progress from the rotation handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationDrag {
    center: Point,
    start_angle: f64,
    initial_rotation: f64,
    snap: Option<f64>,
}

impl RotationDrag {
    pub fn begin(center: Point, pointer: Point, initial_rotation: f64) -> Self {
        Self {
            center,
            start_angle: angle_between(center, pointer),
            initial_rotation,
            snap: None,
        }
    }

    /// Snap results to multiples of `step` degrees. A non-positive step
    /// disables snapping.
    pub fn with_snap(mut self, step: f64) -> Self {
        self.snap = (step > 0.0 && step.is_finite()).then_some(step);
        self
    }

    pub fn snap(&self) -> Option<f64> {
        self.snap
    }

    /// Rotation in degrees, normalized to [0, 360).
    pub fn update(&self, pointer: Point) -> f64 {
        let mut rotation = self.initial_rotation + angle_between(self.center, pointer) - self.start_angle;
        if let Some(step) = self.snap {
            rotation = (rotation / step).round() * step;
        }
        let normalized = rotation.rem_euclid(360.0);
        if normalized >= 360.0 {
            0.0
        } else {
            normalized
        }
    }
}

fn angle_between(center: Point, pointer: Point) -> f64 {
    (pointer.y - center.y).atan2(pointer.x - center.x).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Element, ElementKind};

    fn target(bounds: Rect) -> SelectionTarget {
        SelectionTarget {
            id: Element::new("s", ElementKind::Container).id,
            bounds,
            handles: HandleMask::ALL,
            rotatable: true,
        }
    }

    #[test]
    fn test_single_selection_chrome() {
        let vp = ViewportManager::new(800.0, 600.0);
        let renderer = SelectionRenderer::default();
        let overlay = renderer
            .render(&[target(Rect::new(100.0, 100.0, 200.0, 100.0))], &vp)
            .unwrap();
        assert_eq!(overlay.handles.len(), 8);
        assert_eq!(overlay.rotation_handle, Some(Point::new(200.0, 76.0)));
        assert_eq!(overlay.dimension_label.as_deref(), Some("200 \u{d7} 100"));
        assert!(overlay.badge.is_none());
        assert!(!overlay.is_multi());
    }

    #[test]
    fn test_handles_follow_constraints() {
        let vp = ViewportManager::new(800.0, 600.0);
        let mut t = target(Rect::new(0.0, 0.0, 100.0, 100.0));
        t.handles = HandleMask::CORNERS.without(HandleMask::NORTH_WEST);
        t.rotatable = false;
        let overlay = SelectionRenderer::default().render(&[t], &vp).unwrap();
        let positions: Vec<_> = overlay.handles.iter().map(|h| h.position).collect();
        assert_eq!(
            positions,
            vec![
                HandlePosition::NorthEast,
                HandlePosition::SouthEast,
                HandlePosition::SouthWest
            ]
        );
        assert!(overlay.rotation_handle.is_none());
    }

    #[test]
    fn test_label_hidden_when_small_on_screen() {
        let mut vp = ViewportManager::new(800.0, 600.0);
        vp.update(0.25, 0.0, 0.0);
        let overlay = SelectionRenderer::default()
            .render(&[target(Rect::new(0.0, 0.0, 100.0, 100.0))], &vp)
            .unwrap();
        assert_eq!(overlay.outline.width, 25.0);
        assert!(overlay.dimension_label.is_none());
        // Handles keep their pixel size.
        assert_eq!(overlay.handles[0].rect.width, 8.0);
    }

    #[test]
    fn test_multi_selection_union() {
        let vp = ViewportManager::new(800.0, 600.0);
        let targets = [
            target(Rect::new(10.0, 10.0, 50.0, 50.0)),
            target(Rect::new(100.0, 40.0, 20.0, 80.0)),
            target(Rect::new(30.0, 5.0, 10.0, 10.0)),
        ];
        let overlay = SelectionRenderer::default().render(&targets, &vp).unwrap();
        assert_eq!(overlay.outline, Rect::new(10.0, 5.0, 110.0, 115.0));
        assert_eq!(overlay.handles.len(), 4);
        assert!(overlay.handles.iter().all(|h| h.position.is_corner()));
        assert_eq!(overlay.badge.as_deref(), Some("3 selected"));
        assert!(overlay.rotation_handle.is_none());
        assert!(overlay.dimension_label.is_none());
    }

    #[test]
    fn test_empty_selection() {
        let vp = ViewportManager::new(800.0, 600.0);
        assert!(SelectionRenderer::default().render(&[], &vp).is_none());
    }

    #[test]
    fn test_handle_hit_testing() {
        let vp = ViewportManager::new(800.0, 600.0);
        let overlay = SelectionRenderer::default()
            .render(&[target(Rect::new(100.0, 100.0, 200.0, 100.0))], &vp)
            .unwrap();
        assert_eq!(
            overlay.handle_at(Point::new(301.0, 201.0)),
            Some(HandleHit::Resize(HandlePosition::SouthEast))
        );
        assert_eq!(
            overlay.handle_at(Point::new(100.0, 150.0)),
            Some(HandleHit::Resize(HandlePosition::West))
        );
        assert_eq!(overlay.handle_at(Point::new(200.0, 77.0)), Some(HandleHit::Rotate));
        assert_eq!(overlay.handle_at(Point::new(200.0, 150.0)), None);
    }

    #[test]
    fn test_resize_west_moves_origin() {
        let drag = ResizeDrag::new(
            HandlePosition::West,
            Rect::new(100.0, 100.0, 200.0, 100.0),
            Size::new(10.0, 10.0),
        );
        assert_eq!(drag.update(30.0, 50.0), Rect::new(130.0, 100.0, 170.0, 100.0));
        assert_eq!(drag.update(-20.0, 0.0), Rect::new(80.0, 100.0, 220.0, 100.0));
    }

    #[test]
    fn test_resize_corner_composes_axes() {
        let drag = ResizeDrag::new(
            HandlePosition::NorthEast,
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Size::new(10.0, 10.0),
        );
        assert_eq!(drag.update(20.0, 30.0), Rect::new(0.0, 30.0, 120.0, 70.0));
    }

    #[test]
    fn test_resize_clamps_without_inverting() {
        let west = ResizeDrag::new(
            HandlePosition::NorthWest,
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Size::new(10.0, 20.0),
        );
        // Dragging past the opposite edge pins at min size against it.
        assert_eq!(west.update(500.0, 500.0), Rect::new(90.0, 80.0, 10.0, 20.0));

        let east = ResizeDrag::new(
            HandlePosition::SouthEast,
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Size::new(10.0, 20.0),
        );
        assert_eq!(east.update(-500.0, -500.0), Rect::new(0.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn test_rotation_delta_from_start() {
        let center = Point::new(0.0, 0.0);
        let drag = RotationDrag::begin(center, Point::new(10.0, 0.0), 30.0);
        // No jump on the first update.
        assert!((drag.update(Point::new(10.0, 0.0)) - 30.0).abs() < 1e-9);
        assert!((drag.update(Point::new(0.0, 10.0)) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_snaps_and_normalizes() {
        let center = Point::new(0.0, 0.0);
        let drag = RotationDrag::begin(center, Point::new(10.0, 0.0), 30.0).with_snap(15.0);
        let pointer = Point::new(50f64.to_radians().cos(), 50f64.to_radians().sin());
        assert!((drag.update(pointer) - 75.0).abs() < 1e-9);

        let wrap = RotationDrag::begin(center, Point::new(10.0, 0.0), 350.0);
        let pointer = Point::new(20f64.to_radians().cos(), 20f64.to_radians().sin());
        assert!((wrap.update(pointer) - 10.0).abs() < 1e-9);

        let back = RotationDrag::begin(center, Point::new(10.0, 0.0), 10.0);
        assert!((back.update(Point::new(0.0, -10.0)) - 280.0).abs() < 1e-9);
    }

    #[test]
    fn test_begin_resize_uses_element_constraints() {
        let renderer = SelectionRenderer::default();
        let mut element = Element::new("r", ElementKind::Container);
        element.constraints.min_width = 40.0;
        element.constraints.min_height = 30.0;
        element.constraints.resize_handles = HandleMask::CORNERS;
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);

        let drag = renderer
            .begin_resize(&element, bounds, HandlePosition::SouthEast)
            .unwrap();
        assert_eq!(drag.update(-500.0, -500.0), Rect::new(0.0, 0.0, 40.0, 30.0));
        assert!(renderer.begin_resize(&element, bounds, HandlePosition::East).is_none());

        element.flags.locked = true;
        assert!(renderer.begin_resize(&element, bounds, HandlePosition::SouthEast).is_none());
    }

    #[test]
    fn test_begin_rotation_snaps_to_config_step() {
        let renderer = SelectionRenderer::new(SelectionConfig {
            snap_angle: 45.0,
            ..SelectionConfig::default()
        });
        let element = Element::new("r", ElementKind::Container);
        let bounds = Rect::new(-10.0, -10.0, 20.0, 20.0);
        let drag = renderer
            .begin_rotation(&element, bounds, Point::new(10.0, 0.0))
            .unwrap();
        assert_eq!(drag.snap(), Some(45.0));
        let pointer = Point::new(30f64.to_radians().cos(), 30f64.to_radians().sin());
        assert!((drag.update(pointer) - 45.0).abs() < 1e-9);

        let mut fixed = Element::new("f", ElementKind::Container);
        fixed.constraints.rotatable = false;
        assert!(renderer.begin_rotation(&fixed, bounds, Point::new(10.0, 0.0)).is_none());
    }
}
