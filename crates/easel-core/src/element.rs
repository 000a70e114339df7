use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Size;

/// Unique element identifier.
pub type ElementId = Uuid;

/// Interactive control flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKind {
    Button,
    Input,
    Checkbox,
    Select,
}

/// Primitive shape flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
}

/// The closed set of element kinds the canvas knows how to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Container,
    Text { content: String, font_size: f64 },
    Image { source: String },
    Video { source: String },
    /// An embedded drawing surface.
    Canvas,
    Control { control: ControlKind },
    Shape { shape: ShapeKind },
    Grid,
    Overlay,
}

impl ElementKind {
    pub fn text(content: &str) -> Self {
        ElementKind::Text {
            content: content.to_string(),
            font_size: 14.0,
        }
    }

    pub fn image(source: &str) -> Self {
        ElementKind::Image {
            source: source.to_string(),
        }
    }

    pub fn video(source: &str) -> Self {
        ElementKind::Video {
            source: source.to_string(),
        }
    }

    /// Stable small integer per variant, used when hashing.
    pub fn tag(&self) -> u8 {
        match self {
            ElementKind::Container => 0,
            ElementKind::Text { .. } => 1,
            ElementKind::Image { .. } => 2,
            ElementKind::Video { .. } => 3,
            ElementKind::Canvas => 4,
            ElementKind::Control { .. } => 5,
            ElementKind::Shape { .. } => 6,
            ElementKind::Grid => 7,
            ElementKind::Overlay => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Container => "container",
            ElementKind::Text { .. } => "text",
            ElementKind::Image { .. } => "image",
            ElementKind::Video { .. } => "video",
            ElementKind::Canvas => "canvas",
            ElementKind::Control { .. } => "control",
            ElementKind::Shape { .. } => "shape",
            ElementKind::Grid => "grid",
            ElementKind::Overlay => "overlay",
        }
    }

    /// Size used when width or height is `Auto`. `None` means "fill the parent".
    pub fn default_size(&self) -> Option<Size> {
        match self {
            ElementKind::Container => Some(Size::new(200.0, 200.0)),
            ElementKind::Text { .. } => Some(Size::new(120.0, 24.0)),
            ElementKind::Image { .. } => Some(Size::new(200.0, 150.0)),
            ElementKind::Video { .. } => Some(Size::new(320.0, 180.0)),
            ElementKind::Canvas => Some(Size::new(300.0, 200.0)),
            ElementKind::Control { .. } => Some(Size::new(120.0, 36.0)),
            ElementKind::Shape { .. } => Some(Size::new(100.0, 100.0)),
            ElementKind::Grid | ElementKind::Overlay => None,
        }
    }
}

/// A length along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Dimension {
    /// Absolute world units.
    Px(f64),
    /// Percentage (0-100) of the parent extent.
    Percent(f64),
    #[default]
    Auto,
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self {
            r: 128,
            g: 128,
            b: 128,
            a: 255,
        }
    }
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_f32_array(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Border {
    pub width: f64,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub offset_x: f64,
    pub offset_y: f64,
    pub blur: f64,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum Filter {
    Blur(f64),
    Grayscale(f64),
    Brightness(f64),
}

/// Visual attributes of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub background: Option<Color>,
    pub border: Option<Border>,
    pub corner_radius: f64,
    pub opacity: f64,
    /// Rotation in degrees.
    pub rotation: f64,
    pub scale: f64,
    pub shadow: Option<Shadow>,
    pub filters: Vec<Filter>,
    pub text_color: Color,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            background: None,
            border: None,
            corner_radius: 0.0,
            opacity: 1.0,
            rotation: 0.0,
            scale: 1.0,
            shadow: None,
            filters: Vec::new(),
            text_color: Color::BLACK,
        }
    }
}

impl Style {
    pub fn has_transform(&self) -> bool {
        self.rotation != 0.0 || self.scale != 1.0
    }

    pub fn has_partial_opacity(&self) -> bool {
        self.opacity < 1.0
    }
}

/// Editor state carried on each element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorFlags {
    pub selected: bool,
    pub hovered: bool,
    pub locked: bool,
    pub visible: bool,
    pub dragging: bool,
}

impl Default for EditorFlags {
    fn default() -> Self {
        Self {
            selected: false,
            hovered: false,
            locked: false,
            visible: true,
            dragging: false,
        }
    }
}

/// Bit set of enabled resize handles, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleMask(pub u8);

impl HandleMask {
    pub const NONE: HandleMask = HandleMask(0);
    pub const NORTH: HandleMask = HandleMask(1);
    pub const NORTH_EAST: HandleMask = HandleMask(1 << 1);
    pub const EAST: HandleMask = HandleMask(1 << 2);
    pub const SOUTH_EAST: HandleMask = HandleMask(1 << 3);
    pub const SOUTH: HandleMask = HandleMask(1 << 4);
    pub const SOUTH_WEST: HandleMask = HandleMask(1 << 5);
    pub const WEST: HandleMask = HandleMask(1 << 6);
    pub const NORTH_WEST: HandleMask = HandleMask(1 << 7);
    pub const CORNERS: HandleMask = HandleMask(0b1010_1010);
    pub const EDGES: HandleMask = HandleMask(0b0101_0101);
    pub const ALL: HandleMask = HandleMask(0xFF);

    pub fn contains(&self, other: HandleMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: HandleMask) -> HandleMask {
        HandleMask(self.0 & !other.0)
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

impl Default for HandleMask {
    fn default() -> Self {
        HandleMask::ALL
    }
}

/// Interaction constraints consulted by the selection overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub resize_handles: HandleMask,
    pub rotatable: bool,
    pub min_width: f64,
    pub min_height: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            resize_handles: HandleMask::ALL,
            rotatable: true,
            min_width: 10.0,
            min_height: 10.0,
        }
    }
}

/// A node in the canvas element tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    pub kind: ElementKind,
    pub x: Dimension,
    pub y: Dimension,
    pub width: Dimension,
    pub height: Dimension,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub children: Vec<ElementId>,
    #[serde(default)]
    pub parent: Option<ElementId>,
    #[serde(default)]
    pub flags: EditorFlags,
    #[serde(default)]
    pub constraints: Constraints,
}

impl Element {
    pub fn new(name: &str, kind: ElementKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            x: Dimension::Auto,
            y: Dimension::Auto,
            width: Dimension::Auto,
            height: Dimension::Auto,
            style: Style::default(),
            z_index: 0,
            children: Vec::new(),
            parent: None,
            flags: EditorFlags::default(),
            constraints: Constraints::default(),
        }
    }

    /// Absolute position and size in world units.
    pub fn with_frame(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.x = Dimension::Px(x);
        self.y = Dimension::Px(y);
        self.width = Dimension::Px(width);
        self.height = Dimension::Px(height);
        self
    }

    pub fn with_position(mut self, x: Dimension, y: Dimension) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_size(mut self, width: Dimension, height: Dimension) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn selected(mut self) -> Self {
        self.flags.selected = true;
        self
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_visible(&self) -> bool {
        self.flags.visible && self.style.opacity > 0.0
    }
}
