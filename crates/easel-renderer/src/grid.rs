use std::num::NonZeroUsize;

use easel_core::{Color, Point, Rect};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::render_data::{Stroke, Visual};
use crate::viewport::ViewportManager;

/// Upper bound on lines per axis, guarding against degenerate configs.
const MAX_LINES_PER_AXIS: i64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub enabled: bool,
    /// Cell size in world units.
    pub size: f64,
    /// Every n-th line is a major line.
    pub major_interval: u32,
    pub minor_color: Color,
    pub major_color: Color,
    pub show_rulers: bool,
    /// Ruler thickness in pixels.
    pub ruler_size: f64,
    pub cache_capacity: usize,
    /// Minor lines are dropped when cells get smaller than this on screen.
    pub min_screen_spacing: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 20.0,
            major_interval: 5,
            minor_color: Color::rgba(0, 0, 0, 20),
            major_color: Color::rgba(0, 0, 0, 50),
            show_rulers: false,
            ruler_size: 20.0,
            cache_capacity: 32,
            min_screen_spacing: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// Constant x.
    Vertical,
    /// Constant y.
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLine {
    pub axis: Axis,
    /// World coordinate of the line.
    pub world: f64,
    /// Screen coordinate of the line.
    pub screen: f64,
    pub major: bool,
}

/// Grid lines for one frame, split by weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridOverlay {
    pub minor: Vec<GridLine>,
    pub major: Vec<GridLine>,
    pub screen_width: f64,
    pub screen_height: f64,
}

impl GridOverlay {
    pub fn line_count(&self) -> usize {
        self.minor.len() + self.major.len()
    }

    /// Screen-space line visuals, minor lines first.
    pub fn to_visuals(&self, config: &GridConfig) -> Vec<Visual> {
        let minor = Stroke::solid(1.0, config.minor_color);
        let major = Stroke::solid(1.0, config.major_color);
        self.minor
            .iter()
            .map(|l| (l, minor))
            .chain(self.major.iter().map(|l| (l, major)))
            .map(|(line, stroke)| {
                let (from, to) = match line.axis {
                    Axis::Vertical => (
                        Point::new(line.screen, 0.0),
                        Point::new(line.screen, self.screen_height),
                    ),
                    Axis::Horizontal => (
                        Point::new(0.0, line.screen),
                        Point::new(self.screen_width, line.screen),
                    ),
                };
                Visual::Line { from, to, stroke }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulerTick {
    pub world: f64,
    pub screen: f64,
    pub major: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rulers {
    pub horizontal: Vec<RulerTick>,
    pub vertical: Vec<RulerTick>,
    pub thickness: f64,
}

impl Rulers {
    /// Ruler strips and tick marks in screen space.
    pub fn to_visuals(&self, screen_width: f64, screen_height: f64) -> Vec<Visual> {
        let strip = Color::rgba(245, 245, 245, 230);
        let tick = Stroke::solid(1.0, Color::rgb(120, 120, 120));
        let t = self.thickness;
        let mut out = vec![
            Visual::filled_rect(Rect::new(0.0, 0.0, screen_width, t), strip),
            Visual::filled_rect(Rect::new(0.0, 0.0, t, screen_height), strip),
        ];
        for mark in &self.horizontal {
            let len = if mark.major { t } else { t / 3.0 };
            out.push(Visual::Line {
                from: Point::new(mark.screen, t - len),
                to: Point::new(mark.screen, t),
                stroke: tick,
            });
        }
        for mark in &self.vertical {
            let len = if mark.major { t } else { t / 3.0 };
            out.push(Visual::Line {
                from: Point::new(t - len, mark.screen),
                to: Point::new(t, mark.screen),
                stroke: tick,
            });
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridKey {
    screen_width: u64,
    screen_height: u64,
    size: u64,
    zoom: u64,
    x_range: (i64, i64),
    y_range: (i64, i64),
}

/// World-space line positions; screen positions are derived per call.
#[derive(Debug, Clone)]
struct GridLines {
    vertical: Vec<(f64, bool)>,
    horizontal: Vec<(f64, bool)>,
}

/// Draws the background grid and optional rulers.
pub struct GridRenderer {
    config: GridConfig,
    cache: LruCache<GridKey, GridLines>,
    hits: u64,
    misses: u64,
}

impl GridRenderer {
    pub fn new(config: GridConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Grid lines covering the visible world range.
    pub fn render(&mut self, viewport: &ViewportManager) -> GridOverlay {
        let screen = viewport.screen_size();
        let mut overlay = GridOverlay {
            screen_width: screen.width,
            screen_height: screen.height,
            ..GridOverlay::default()
        };
        let size = self.config.size;
        if !self.config.enabled || !(size > 0.0) || !size.is_finite() {
            return overlay;
        }

        let bounds = viewport.get_bounds();
        let x_range = snapped_range(bounds.left, bounds.right, size);
        let y_range = snapped_range(bounds.top, bounds.bottom, size);
        let key = GridKey {
            screen_width: screen.width.to_bits(),
            screen_height: screen.height.to_bits(),
            size: size.to_bits(),
            zoom: viewport.zoom().to_bits(),
            x_range,
            y_range,
        };

        let lines = match self.cache.get(&key) {
            Some(lines) => {
                self.hits += 1;
                lines.clone()
            }
            None => {
                self.misses += 1;
                let include_minor = size * viewport.zoom() >= self.config.min_screen_spacing;
                let lines = GridLines {
                    vertical: self.lines_in(x_range, include_minor),
                    horizontal: self.lines_in(y_range, include_minor),
                };
                self.cache.put(key, lines.clone());
                lines
            }
        };

        for (axis, positions) in [
            (Axis::Vertical, &lines.vertical),
            (Axis::Horizontal, &lines.horizontal),
        ] {
            for &(world, major) in positions.iter() {
                let screen = match axis {
                    Axis::Vertical => viewport.world_to_screen(world, 0.0).x,
                    Axis::Horizontal => viewport.world_to_screen(0.0, world).y,
                };
                let line = GridLine {
                    axis,
                    world,
                    screen,
                    major,
                };
                if major {
                    overlay.major.push(line);
                } else {
                    overlay.minor.push(line);
                }
            }
        }
        overlay
    }

    /// Ruler ticks for the current view. Never cached.
    pub fn rulers(&self, viewport: &ViewportManager) -> Option<Rulers> {
        let size = self.config.size;
        if !self.config.show_rulers || !(size > 0.0) || !size.is_finite() {
            return None;
        }
        let bounds = viewport.get_bounds();
        let include_minor = size * viewport.zoom() >= self.config.min_screen_spacing;
        let tick = |world: f64, major: bool, screen: f64| RulerTick {
            world,
            screen,
            major,
            label: major.then(|| format_coordinate(world)),
        };

        let horizontal = self
            .lines_in(snapped_range(bounds.left, bounds.right, size), include_minor)
            .into_iter()
            .map(|(world, major)| tick(world, major, viewport.world_to_screen(world, 0.0).x))
            .collect();
        let vertical = self
            .lines_in(snapped_range(bounds.top, bounds.bottom, size), include_minor)
            .into_iter()
            .map(|(world, major)| tick(world, major, viewport.world_to_screen(0.0, world).y))
            .collect();

        Some(Rulers {
            horizontal,
            vertical,
            thickness: self.config.ruler_size,
        })
    }

    fn lines_in(&self, (first, last): (i64, i64), include_minor: bool) -> Vec<(f64, bool)> {
        let interval = i64::from(self.config.major_interval.max(1));
        if last - first > MAX_LINES_PER_AXIS {
            if (last - first) / interval > MAX_LINES_PER_AXIS {
                log::debug!("Grid too dense ({} lines), skipping", last - first);
                return Vec::new();
            }
            log::debug!("Grid too dense ({} lines), drawing major lines only", last - first);
            let start = first + (interval - first.rem_euclid(interval)) % interval;
            return (start..=last)
                .step_by(interval as usize)
                .map(|i| (i as f64 * self.config.size, true))
                .collect();
        }
        (first..=last)
            .filter_map(|i| {
                let major = i.rem_euclid(interval) == 0;
                (major || include_minor).then(|| (i as f64 * self.config.size, major))
            })
            .collect()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Cumulative (hits, misses) of the line cache.
    pub fn cache_counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

/// Line indices from floor(start / size) to ceil(end / size).
fn snapped_range(start: f64, end: f64, size: f64) -> (i64, i64) {
    ((start / size).floor() as i64, (end / size).ceil() as i64)
}

fn format_coordinate(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.1}", v)
    }
}
