//! # Easel Core
//!
//! Domain data consumed by the Easel renderer: geometry primitives, the typed
//! element model, the element tree snapshot, bounds resolution, and the
//! R-tree spatial index used for viewport culling and hit testing.

pub mod element;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod spatial;
pub mod tree;

pub use element::{
    Border, Color, Constraints, ControlKind, Dimension, EditorFlags, Element, ElementId,
    ElementKind, Filter, HandleMask, Shadow, ShapeKind, Style,
};
pub use error::{CoreError, Result};
pub use geometry::{Point, Rect, Size};
pub use layout::resolve_bounds;
pub use spatial::{SpatialEntry, SpatialIndex, SpatialQuery};
pub use tree::ElementTree;
