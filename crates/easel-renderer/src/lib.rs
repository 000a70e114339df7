//! # Easel Renderer
//!
//! Frame pipeline for the Easel canvas editor. Turns an element tree snapshot
//! and a viewport into a composed visual description the host can draw.
//!
//! The pipeline culls against the spatial index, builds render objects,
//! sorts them into layers, picks level of detail, resolves per-element
//! visuals through a content-keyed LRU cache, and hands the result to a
//! host [`RenderHandler`]. Grid, ruler and selection overlays are produced in
//! screen space alongside. The built-in [`DisplayListHandler`] emits a
//! JSON-serializable [`DisplayList`] for a webview frontend.

pub mod cache;
pub mod config;
pub mod culler;
pub mod error;
pub mod grid;
pub mod layer;
pub mod metrics;
pub mod pipeline;
pub mod render_data;
pub mod render_object;
pub mod selection;
pub mod viewport;
pub mod visual;

pub use cache::{CacheConfig, CacheKey, CacheStats, RenderCache};
pub use config::PipelineConfig;
pub use culler::{CullStats, SpatialCuller};
pub use error::{RenderError, Result};
pub use grid::{GridConfig, GridOverlay, GridRenderer, Rulers};
pub use layer::{Layer, LayerGroups};
pub use metrics::{FrameMetrics, PhaseBreakdown, PhaseMetric};
pub use pipeline::{
    DirtyTarget, DisplayListHandler, FrameContext, FrameInput, FrameOverlays, FrameResult,
    FrameStats, FrameTrace, Phase, PhaseRecord, PhaseStatus, RenderHandler, RenderItem,
    RenderPipeline,
};
pub use render_data::{DisplayList, EstimateSize, Visual};
pub use render_object::RenderObject;
pub use selection::{
    HandleHit, HandlePosition, ResizeDrag, RotationDrag, SelectionConfig, SelectionOverlay,
    SelectionRenderer, SelectionTarget,
};
pub use viewport::{DetailLevel, ViewportBounds, ViewportConfig, ViewportManager, ViewportTransform};
