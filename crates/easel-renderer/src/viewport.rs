use std::cell::Cell;

use easel_core::{Point, Rect, Size};
use serde::{Deserialize, Serialize};

/// Optional clamp range for the pan offset, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanLimits {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub pan_limits: Option<PanLimits>,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 10.0,
            pan_limits: None,
        }
    }
}

/// The visible rectangle of world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ViewportBounds {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width(), self.height())
    }
}

/// Affine world→screen matrix `[a, b, c, d, e, f]` in canvas order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportTransform {
    pub matrix: [f64; 6],
}

impl ViewportTransform {
    pub fn apply(&self, p: Point) -> Point {
        let [a, b, c, d, e, f] = self.matrix;
        Point::new(a * p.x + c * p.y + e, b * p.x + d * p.y + f)
    }
}

/// Semantic zoom level for level-of-detail rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailLevel {
    Full,
    Reduced,
    Minimal,
}

/// Owns zoom, pan, and screen size, and all coordinate conversions.
///
/// `screen = (world + pan) * zoom`. Bounds and transform are memoized until
/// the next state-changing call.
#[derive(Debug, Clone)]
pub struct ViewportManager {
    config: ViewportConfig,
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
    screen_width: f64,
    screen_height: f64,
    revision: u64,
    bounds: Cell<Option<ViewportBounds>>,
    transform: Cell<Option<ViewportTransform>>,
}

impl ViewportManager {
    pub fn new(screen_width: f64, screen_height: f64) -> Self {
        Self::with_config(screen_width, screen_height, ViewportConfig::default())
    }

    pub fn with_config(screen_width: f64, screen_height: f64, config: ViewportConfig) -> Self {
        let mut config = config;
        if !(config.min_zoom > 0.0) || !config.min_zoom.is_finite() {
            config.min_zoom = ViewportConfig::default().min_zoom;
        }
        if !(config.max_zoom >= config.min_zoom) || !config.max_zoom.is_finite() {
            config.max_zoom = config.min_zoom.max(ViewportConfig::default().max_zoom);
        }
        Self {
            zoom: 1.0_f64.clamp(config.min_zoom, config.max_zoom),
            config,
            pan_x: 0.0,
            pan_y: 0.0,
            screen_width: sanitize_extent(screen_width),
            screen_height: sanitize_extent(screen_height),
            revision: 0,
            bounds: Cell::new(None),
            transform: Cell::new(None),
        }
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    pub fn screen_size(&self) -> Size {
        Size::new(self.screen_width, self.screen_height)
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    /// Bumped by every call that changes state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Set zoom and pan together. Values are clamped; non-finite inputs keep
    /// the current value. Returns whether anything changed.
    pub fn update(&mut self, zoom: f64, pan_x: f64, pan_y: f64) -> bool {
        let zoom = self.clamp_zoom(if zoom.is_finite() { zoom } else { self.zoom });
        let pan_x = if pan_x.is_finite() { pan_x } else { self.pan_x };
        let pan_y = if pan_y.is_finite() { pan_y } else { self.pan_y };
        let (pan_x, pan_y) = self.clamp_pan(pan_x, pan_y);

        if zoom == self.zoom && pan_x == self.pan_x && pan_y == self.pan_y {
            return false;
        }
        self.zoom = zoom;
        self.pan_x = pan_x;
        self.pan_y = pan_y;
        self.invalidate();
        true
    }

    /// Change the screen size. Non-positive sizes are clamped to one pixel.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.screen_width = sanitize_extent(width);
        self.screen_height = sanitize_extent(height);
        self.invalidate();
    }

    /// Pan by a screen-space delta in pixels.
    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        self.update(self.zoom, self.pan_x + dx / self.zoom, self.pan_y + dy / self.zoom)
    }

    /// Zoom about the screen centre.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        if !zoom.is_finite() {
            return false;
        }
        self.apply_zoom(
            zoom - self.zoom,
            self.screen_width / 2.0,
            self.screen_height / 2.0,
        )
    }

    /// Zoom by `delta` keeping the world point under the focus fixed on screen.
    pub fn apply_zoom(&mut self, delta: f64, focus_x: f64, focus_y: f64) -> bool {
        if !delta.is_finite() || !focus_x.is_finite() || !focus_y.is_finite() {
            return false;
        }
        let anchor = self.screen_to_world(focus_x, focus_y);
        let zoom = self.clamp_zoom(self.zoom + delta);
        let pan_x = focus_x / zoom - anchor.x;
        let pan_y = focus_y / zoom - anchor.y;
        self.update(zoom, pan_x, pan_y)
    }

    /// Multiplicative zoom about a focus point.
    pub fn apply_zoom_factor(&mut self, factor: f64, focus_x: f64, focus_y: f64) -> bool {
        self.apply_zoom(self.zoom * (factor - 1.0), focus_x, focus_y)
    }

    /// Zoom and centre so `bounds` plus `padding` fills the screen.
    pub fn fit_to_bounds(&mut self, bounds: &Rect, padding: f64) -> bool {
        let center = bounds.center();
        let padding = if padding.is_finite() { padding.max(0.0) } else { 0.0 };
        let zoom = if bounds.width <= 0.0 && bounds.height <= 0.0 {
            self.zoom
        } else {
            let zoom_x = self.screen_width / (bounds.width + 2.0 * padding);
            let zoom_y = self.screen_height / (bounds.height + 2.0 * padding);
            self.clamp_zoom(zoom_x.min(zoom_y).min(self.config.max_zoom))
        };
        let pan_x = self.screen_width / (2.0 * zoom) - center.x;
        let pan_y = self.screen_height / (2.0 * zoom) - center.y;
        self.update(zoom, pan_x, pan_y)
    }

    /// Back to zoom 1 with no pan.
    pub fn reset(&mut self) {
        self.zoom = self.clamp_zoom(1.0);
        let (pan_x, pan_y) = self.clamp_pan(0.0, 0.0);
        self.pan_x = pan_x;
        self.pan_y = pan_y;
        self.invalidate();
    }

    // ── Conversions ──────────────────────────────────────────────────

    pub fn world_to_screen(&self, x: f64, y: f64) -> Point {
        Point::new((x + self.pan_x) * self.zoom, (y + self.pan_y) * self.zoom)
    }

    pub fn screen_to_world(&self, x: f64, y: f64) -> Point {
        Point::new(x / self.zoom - self.pan_x, y / self.zoom - self.pan_y)
    }

    pub fn world_rect_to_screen(&self, rect: &Rect) -> Rect {
        let origin = self.world_to_screen(rect.x, rect.y);
        Rect::new(
            origin.x,
            origin.y,
            rect.width * self.zoom,
            rect.height * self.zoom,
        )
    }

    pub fn screen_rect_to_world(&self, rect: &Rect) -> Rect {
        let origin = self.screen_to_world(rect.x, rect.y);
        Rect::new(
            origin.x,
            origin.y,
            rect.width / self.zoom,
            rect.height / self.zoom,
        )
    }

    /// Get the visible bounds in world coordinates.
    pub fn get_bounds(&self) -> ViewportBounds {
        if let Some(bounds) = self.bounds.get() {
            return bounds;
        }
        let top_left = self.screen_to_world(0.0, 0.0);
        let bounds = ViewportBounds {
            left: top_left.x,
            top: top_left.y,
            right: top_left.x + self.screen_width / self.zoom,
            bottom: top_left.y + self.screen_height / self.zoom,
        };
        self.bounds.set(Some(bounds));
        bounds
    }

    pub fn transform(&self) -> ViewportTransform {
        if let Some(transform) = self.transform.get() {
            return transform;
        }
        let transform = ViewportTransform {
            matrix: [
                self.zoom,
                0.0,
                0.0,
                self.zoom,
                self.pan_x * self.zoom,
                self.pan_y * self.zoom,
            ],
        };
        self.transform.set(Some(transform));
        transform
    }

    pub fn is_visible(&self, rect: &Rect) -> bool {
        self.get_bounds().to_rect().intersects(rect)
    }

    /// Determine the semantic zoom level for level-of-detail rendering.
    pub fn detail_level(&self) -> DetailLevel {
        if self.zoom >= 1.0 {
            DetailLevel::Full
        } else if self.zoom >= 0.5 {
            DetailLevel::Reduced
        } else {
            DetailLevel::Minimal
        }
    }

    /// Whether the memoized bounds are currently populated.
    pub fn has_cached_bounds(&self) -> bool {
        self.bounds.get().is_some()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn invalidate(&mut self) {
        self.revision += 1;
        self.bounds.set(None);
        self.transform.set(None);
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.config.min_zoom, self.config.max_zoom)
    }

    fn clamp_pan(&self, pan_x: f64, pan_y: f64) -> (f64, f64) {
        match self.config.pan_limits {
            Some(limits) => (
                pan_x.max(limits.min_x).min(limits.max_x),
                pan_y.max(limits.min_y).min(limits.max_y),
            ),
            None => (pan_x, pan_y),
        }
    }
}

fn sanitize_extent(v: f64) -> f64 {
    if v.is_finite() {
        v.max(1.0)
    } else {
        1.0
    }
}
