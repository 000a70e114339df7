//! Per-frame phase state machine.
//!
//! A frame runs Prepare, Cull, Build, Sort, Optimize, Render, Composite,
//! Effects, Overlay and Finalize in that order. Render and Composite are
//! critical: a failure there aborts the frame and leaves dirty state intact so
//! the next frame retries. Every other phase logs its failure, is recorded as
//! failed in the trace, and the frame continues with what it has.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use easel_core::{
    Color, CoreError, ElementId, ElementTree, HandleMask, Rect, Size, SpatialQuery,
};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, CacheStats, RenderCache};
use crate::config::PipelineConfig;
use crate::culler::{CullStats, SpatialCuller};
use crate::error::{RenderError, Result};
use crate::grid::{GridOverlay, GridRenderer, Rulers};
use crate::layer::{Layer, LayerGroups};
use crate::metrics::{FrameMetrics, MetricsRecorder, PhaseBreakdown};
use crate::render_data::{DisplayItem, DisplayLayer, DisplayList, Stroke, Visual};
use crate::render_object::{priority_cmp, RenderObject};
use crate::selection::{SelectionOverlay, SelectionRenderer, SelectionTarget};
use crate::viewport::{DetailLevel, ViewportBounds, ViewportManager, ViewportTransform};
use crate::visual::{build_visual, lod_visual};

const DEBUG_BOUNDS: Color = Color::rgba(255, 0, 128, 200);
const DEBUG_LOD_BOUNDS: Color = Color::rgba(255, 160, 0, 200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Prepare,
    Cull,
    Build,
    Sort,
    Optimize,
    Render,
    Composite,
    Effects,
    Overlay,
    Finalize,
}

impl Phase {
    pub const ORDER: [Phase; 10] = [
        Phase::Prepare,
        Phase::Cull,
        Phase::Build,
        Phase::Sort,
        Phase::Optimize,
        Phase::Render,
        Phase::Composite,
        Phase::Effects,
        Phase::Overlay,
        Phase::Finalize,
    ];

    /// Critical phases abort the frame on failure.
    pub const fn is_critical(&self) -> bool {
        matches!(self, Phase::Render | Phase::Composite)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Cull => "cull",
            Phase::Build => "build",
            Phase::Sort => "sort",
            Phase::Optimize => "optimize",
            Phase::Render => "render",
            Phase::Composite => "composite",
            Phase::Effects => "effects",
            Phase::Overlay => "overlay",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Completed,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub duration: Duration,
    pub object_count: usize,
}

/// What happened to each phase of one frame, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTrace {
    pub frame: u64,
    records: Vec<PhaseRecord>,
}

impl FrameTrace {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            records: Vec::with_capacity(Phase::ORDER.len()),
        }
    }

    pub fn push(&mut self, record: PhaseRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.records.iter().map(|r| r.phase).collect()
    }

    pub fn get(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.records.iter().find(|r| r.phase == phase)
    }

    pub fn status(&self, phase: Phase) -> Option<&PhaseStatus> {
        self.get(phase).map(|r| &r.status)
    }

    pub fn total_duration(&self) -> Duration {
        self.records.iter().map(|r| r.duration).sum()
    }
}

enum PhaseOutcome {
    Completed(usize),
    Skipped(&'static str),
}

/// External invalidation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DirtyTarget {
    Element(ElementId),
    /// Every element intersecting this world rectangle.
    Region(Rect),
}

/// Everything the host hands the pipeline for one frame.
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
    pub tree: &'a ElementTree,
    pub viewport: &'a ViewportManager,
    pub index: Option<&'a dyn SpatialQuery>,
    /// Selected ids in addition to elements flagged selected.
    pub selection: &'a [ElementId],
}

impl<'a> FrameInput<'a> {
    pub fn new(tree: &'a ElementTree, viewport: &'a ViewportManager) -> Self {
        Self {
            tree,
            viewport,
            index: None,
            selection: &[],
        }
    }

    pub fn with_index(mut self, index: &'a dyn SpatialQuery) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_selection(mut self, selection: &'a [ElementId]) -> Self {
        self.selection = selection;
        self
    }
}

/// Consecutive simple objects on one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub layer: Layer,
    /// Arena indices in paint order.
    pub objects: Vec<usize>,
}

/// Per-frame working state shared between phases.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame: u64,
    pub viewport: ViewportBounds,
    pub transform: ViewportTransform,
    pub zoom: f64,
    pub detail: DetailLevel,
    /// Reference size for root-level percentages.
    pub screen: Size,
    /// Prepare: every element id in preorder.
    pub candidates: Vec<ElementId>,
    /// Prepare: validated selection.
    pub selection: HashSet<ElementId>,
    /// Cull: ids near the viewport, in preorder.
    pub visible: Vec<ElementId>,
    /// Build: object arena; parents are referenced by index.
    pub objects: Vec<RenderObject>,
    /// Build: ids forced to re-render this frame.
    pub dirty: HashSet<ElementId>,
    /// Sort: arena indices in paint order.
    pub order: Vec<usize>,
    /// Sort: `order` bucketed by layer.
    pub layers: LayerGroups,
    /// Optimize.
    pub batches: Vec<Batch>,
    /// Render: arena indices handed to the host.
    pub rendered: Vec<usize>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    overlays: FrameOverlays,
}

impl FrameContext {
    fn new(frame: u64, viewport: &ViewportManager) -> Self {
        Self {
            frame,
            viewport: viewport.get_bounds(),
            transform: viewport.transform(),
            zoom: viewport.zoom(),
            detail: viewport.detail_level(),
            screen: viewport.screen_size(),
            candidates: Vec::new(),
            selection: HashSet::new(),
            visible: Vec::new(),
            objects: Vec::new(),
            dirty: HashSet::new(),
            order: Vec::new(),
            layers: LayerGroups::new(),
            batches: Vec::new(),
            rendered: Vec::new(),
            cache_hits: 0,
            cache_misses: 0,
            overlays: FrameOverlays::default(),
        }
    }

    /// Objects in paint order.
    pub fn sorted_objects(&self) -> impl Iterator<Item = &RenderObject> {
        self.order.iter().map(|&i| &self.objects[i])
    }

    pub fn lod_count(&self) -> usize {
        self.objects.iter().filter(|o| o.lod).count()
    }
}

/// An object with its resolved visual, as handed to the host.
#[derive(Debug, Clone)]
pub struct RenderItem<'a> {
    pub index: usize,
    pub object: &'a RenderObject,
    /// Local-space visual.
    pub visual: Visual,
}

/// Host drawing backend. Only `render` is required.
pub trait RenderHandler {
    type Output;

    /// Draw the visible objects, given in paint order.
    fn render(&mut self, items: &[RenderItem<'_>], frame: &FrameContext) -> Result<Self::Output>;

    /// Merge layered output. Must keep the paint order of `draft`.
    fn composite(
        &mut self,
        _layers: &LayerGroups,
        draft: Self::Output,
        _frame: &FrameContext,
    ) -> Result<Self::Output> {
        Ok(draft)
    }

    fn apply_effects(&mut self, _output: &mut Self::Output, _frame: &FrameContext) -> Result<()> {
        Ok(())
    }

    fn supports_composite(&self) -> bool {
        false
    }
}

/// Produces a serializable [`DisplayList`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayListHandler;

impl RenderHandler for DisplayListHandler {
    type Output = DisplayList;

    fn render(&mut self, items: &[RenderItem<'_>], frame: &FrameContext) -> Result<DisplayList> {
        let mut list = DisplayList::empty(frame.viewport, frame.transform);
        for item in items {
            let object = item.object;
            let entry = DisplayItem {
                element: object.id,
                bounds: object.bounds,
                z_index: object.z_index,
                opacity: object.opacity,
                rotation: object.rotation,
                scale: object.scale,
                visual: item.visual.clone(),
            };
            match list.layers.last_mut() {
                Some(last) if last.layer == object.layer => last.items.push(entry),
                _ => list.layers.push(DisplayLayer {
                    layer: object.layer,
                    items: vec![entry],
                }),
            }
        }
        Ok(list)
    }

    /// Regroup into exactly one display layer per occupied layer, in layer
    /// order, keeping item order inside each.
    fn composite(
        &mut self,
        layers: &LayerGroups,
        draft: DisplayList,
        _frame: &FrameContext,
    ) -> Result<DisplayList> {
        let mut by_layer: HashMap<Layer, Vec<DisplayItem>> = HashMap::new();
        for layer in draft.layers {
            by_layer.entry(layer.layer).or_default().extend(layer.items);
        }
        let mut merged: Vec<DisplayLayer> = layers
            .iter()
            .filter_map(|(layer, _)| {
                by_layer.remove(&layer).map(|items| DisplayLayer { layer, items })
            })
            .collect();
        // Anything the host added outside the sorted groups goes last, in layer order.
        let mut rest: Vec<DisplayLayer> = by_layer
            .into_iter()
            .map(|(layer, items)| DisplayLayer { layer, items })
            .collect();
        rest.sort_by_key(|l| l.layer);
        merged.extend(rest);
        merged.retain(|l| !l.items.is_empty());

        Ok(DisplayList {
            layers: merged,
            viewport: draft.viewport,
            transform: draft.transform,
        })
    }

    fn supports_composite(&self) -> bool {
        true
    }
}

/// Screen-space decorations produced by the Overlay phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameOverlays {
    pub grid: Option<GridOverlay>,
    pub rulers: Option<Rulers>,
    pub selection: Option<SelectionOverlay>,
    /// Object bounds, drawn on the debug layer.
    pub debug: Vec<Visual>,
}

impl FrameOverlays {
    pub fn is_empty(&self) -> bool {
        self.grid.is_none() && self.rulers.is_none() && self.selection.is_none() && self.debug.is_empty()
    }

    /// Overlay visuals grouped by the layer they belong on, in layer order.
    pub fn layered_visuals(&self, config: &PipelineConfig, screen: Size) -> Vec<(Layer, Vec<Visual>)> {
        let mut out = Vec::new();
        if let Some(grid) = &self.grid {
            out.push((Layer::Grid, grid.to_visuals(&config.grid)));
        }
        if let Some(selection) = &self.selection {
            out.push((Layer::Handles, selection.to_visuals(&config.selection)));
        }
        if let Some(rulers) = &self.rulers {
            out.push((Layer::Guides, rulers.to_visuals(screen.width, screen.height)));
        }
        if !self.debug.is_empty() {
            out.push((Layer::Debug, self.debug.clone()));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame: u64,
    pub total_elements: usize,
    pub visible: usize,
    pub culled: usize,
    pub built: usize,
    pub rendered: usize,
    pub lod_objects: usize,
    pub batches: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub duration: Duration,
    pub over_budget: bool,
}

/// Result of a successful frame.
#[derive(Debug, Clone)]
pub struct FrameResult<O> {
    pub output: O,
    pub overlays: FrameOverlays,
    pub trace: FrameTrace,
    pub stats: FrameStats,
}

/// Drives frames through the phase sequence and owns the frame-spanning state:
/// the visual cache, dirty sets, overlay renderers and metrics.
pub struct RenderPipeline {
    config: PipelineConfig,
    cache: RenderCache<Visual>,
    culler: SpatialCuller,
    grid: GridRenderer,
    selection: SelectionRenderer,
    metrics: MetricsRecorder,
    dirty_ids: HashSet<ElementId>,
    dirty_regions: Vec<Rect>,
    frame: u64,
}

impl RenderPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let cache = RenderCache::new(config.cache);
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: PipelineConfig, cache: RenderCache<Visual>) -> Self {
        Self {
            culler: SpatialCuller::new(config.cull_margin),
            grid: GridRenderer::new(config.grid),
            selection: SelectionRenderer::new(config.selection),
            metrics: MetricsRecorder::new(config.metrics_window),
            cache,
            config,
            dirty_ids: HashSet::new(),
            dirty_regions: Vec::new(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &RenderCache<Visual> {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.grid.clear_cache();
    }

    /// Force a rebuild of an element, or of everything in a region, next frame.
    pub fn mark_dirty(&mut self, target: DirtyTarget) {
        match target {
            DirtyTarget::Element(id) => {
                self.dirty_ids.insert(id);
            }
            DirtyTarget::Region(rect) => self.dirty_regions.push(rect),
        }
    }

    pub fn is_dirty(&self, id: &ElementId) -> bool {
        self.dirty_ids.contains(id)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty_ids.len()
    }

    pub fn dirty_regions(&self) -> &[Rect] {
        &self.dirty_regions
    }

    pub fn get_metrics(&self) -> FrameMetrics {
        self.metrics.snapshot(self.cache.stats())
    }

    pub fn get_phase_breakdown(&self) -> Vec<PhaseBreakdown> {
        self.metrics.breakdown()
    }

    pub fn culling_stats(&self) -> CullStats {
        self.culler.last_stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn metrics_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Report<'a> {
            metrics: FrameMetrics,
            phases: Vec<PhaseBreakdown>,
            culling: CullStats,
            config: &'a PipelineConfig,
        }
        Ok(serde_json::to_string_pretty(&Report {
            metrics: self.get_metrics(),
            phases: self.get_phase_breakdown(),
            culling: self.culling_stats(),
            config: &self.config,
        })?)
    }

    /// Run one frame.
    ///
    /// A failing Render or Composite phase aborts with
    /// [`RenderError::PhaseFailed`]; the host should keep showing its last
    /// good frame. Dirty state is untouched in that case.
    pub fn render_frame<H: RenderHandler>(
        &mut self,
        input: FrameInput<'_>,
        handler: &mut H,
    ) -> Result<FrameResult<H::Output>> {
        let started = Instant::now();
        self.frame += 1;
        let mut ctx = FrameContext::new(self.frame, input.viewport);
        let mut trace = FrameTrace::new(self.frame);
        let mut draft: Option<H::Output> = None;

        for phase in Phase::ORDER {
            let phase_start = Instant::now();
            let result = match phase {
                Phase::Prepare => self.prepare(&input, &mut ctx),
                Phase::Cull => self.cull(&input, &mut ctx),
                Phase::Build => self.build(&input, &mut ctx),
                Phase::Sort => Self::sort(&mut ctx),
                Phase::Optimize => self.optimize(&mut ctx),
                Phase::Render => self.render(input.tree, &mut ctx, handler).map(|output| {
                    draft = Some(output);
                    PhaseOutcome::Completed(ctx.rendered.len())
                }),
                Phase::Composite => {
                    if !handler.supports_composite() {
                        Ok(PhaseOutcome::Skipped("no compositor"))
                    } else {
                        match draft.take() {
                            Some(output) => handler.composite(&ctx.layers, output, &ctx).map(|merged| {
                                draft = Some(merged);
                                PhaseOutcome::Completed(ctx.layers.layer_count())
                            }),
                            None => Err(RenderError::InvalidInput("nothing to composite".into())),
                        }
                    }
                }
                Phase::Effects => match draft.as_mut() {
                    Some(output) => handler
                        .apply_effects(output, &ctx)
                        .map(|()| PhaseOutcome::Completed(ctx.rendered.len())),
                    None => Ok(PhaseOutcome::Skipped("no output")),
                },
                Phase::Overlay => self.overlay(&input, &mut ctx),
                Phase::Finalize => self.finalize(&mut ctx),
            };
            let duration = phase_start.elapsed();
            if self.config.debug_mode {
                log::debug!("Frame {} {} phase took {:?}", ctx.frame, phase, duration);
            }

            let (status, object_count) = match result {
                Ok(PhaseOutcome::Completed(n)) => (PhaseStatus::Completed, n),
                Ok(PhaseOutcome::Skipped(reason)) => (PhaseStatus::Skipped(reason.to_string()), 0),
                Err(err) if phase.is_critical() => {
                    log::error!("Frame {} aborted in {} phase: {}", ctx.frame, phase, err);
                    trace.push(PhaseRecord {
                        phase,
                        status: PhaseStatus::Failed(err.to_string()),
                        duration,
                        object_count: 0,
                    });
                    self.metrics.record_failure(&trace);
                    return Err(RenderError::PhaseFailed {
                        phase,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    log::warn!("Frame {} {} phase failed, skipping: {}", ctx.frame, phase, err);
                    (PhaseStatus::Failed(err.to_string()), 0)
                }
            };
            trace.push(PhaseRecord {
                phase,
                status,
                duration,
                object_count,
            });
        }

        let output = draft.ok_or_else(|| RenderError::PhaseFailed {
            phase: Phase::Render,
            message: "no output produced".to_string(),
        })?;

        let duration = started.elapsed();
        let budget = self.config.frame_budget();
        let over_budget = duration > budget;
        if over_budget {
            log::warn!(
                "Frame {} took {:?}, over the {:?} budget",
                ctx.frame,
                duration,
                budget
            );
        }

        let stats = FrameStats {
            frame: ctx.frame,
            total_elements: ctx.candidates.len(),
            visible: ctx.visible.len(),
            culled: ctx.candidates.len().saturating_sub(ctx.visible.len()),
            built: ctx.objects.len(),
            rendered: ctx.rendered.len(),
            lod_objects: ctx.lod_count(),
            batches: ctx.batches.len(),
            cache_hits: ctx.cache_hits,
            cache_misses: ctx.cache_misses,
            duration,
            over_budget,
        };
        self.metrics.record_frame(&trace, &stats);

        Ok(FrameResult {
            output,
            overlays: std::mem::take(&mut ctx.overlays),
            trace,
            stats,
        })
    }

    // ── Phases ───────────────────────────────────────────────────────

    fn prepare(&self, input: &FrameInput<'_>, ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        ctx.candidates = input.tree.preorder();
        ctx.visible = ctx.candidates.clone();

        for id in input.selection {
            if input.tree.contains(id) {
                ctx.selection.insert(*id);
            } else {
                log::warn!("Dropping unknown selected element {}", id);
            }
        }
        ctx.selection
            .extend(input.tree.iter().filter(|e| e.flags.selected).map(|e| e.id));

        let bounds = ctx.viewport;
        if !(bounds.width() > 0.0 && bounds.height() > 0.0)
            || !bounds.width().is_finite()
            || !bounds.height().is_finite()
        {
            return Err(RenderError::InvalidInput(format!(
                "viewport has no area ({} x {})",
                bounds.width(),
                bounds.height()
            )));
        }
        Ok(PhaseOutcome::Completed(ctx.candidates.len()))
    }

    fn cull(&mut self, input: &FrameInput<'_>, ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        let skip = if ctx.candidates.is_empty() {
            Some("empty tree")
        } else if !self.config.enable_culling {
            Some("culling disabled")
        } else if input.index.is_none() {
            Some("no spatial index")
        } else {
            None
        };
        if let Some(reason) = skip {
            // Stats reflect this frame even when nothing is culled.
            ctx.visible = self.culler.cull(&ctx.viewport, None, &ctx.candidates)?;
            return Ok(PhaseOutcome::Skipped(reason));
        }
        ctx.visible = self.culler.cull(&ctx.viewport, input.index, &ctx.candidates)?;
        Ok(PhaseOutcome::Completed(ctx.visible.len()))
    }

    fn build(&mut self, input: &FrameInput<'_>, ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        if ctx.visible.is_empty() {
            return Ok(PhaseOutcome::Skipped("nothing visible"));
        }
        let tree = input.tree;
        let mut slots: HashMap<ElementId, usize> = HashMap::with_capacity(ctx.visible.len());

        // Preorder puts parents first, so one pass finds every hidden subtree.
        let mut hidden: HashSet<ElementId> = HashSet::new();
        for id in &ctx.candidates {
            if let Some(element) = tree.get(id) {
                if !element.is_visible() || element.parent.is_some_and(|p| hidden.contains(&p)) {
                    hidden.insert(*id);
                }
            }
        }

        for id in &ctx.visible {
            if ctx.objects.len() >= self.config.max_render_objects {
                log::warn!(
                    "Render object limit {} reached, dropping {} elements",
                    self.config.max_render_objects,
                    ctx.visible.len() - ctx.objects.len()
                );
                break;
            }
            let Some(element) = tree.get(id) else {
                log::warn!("Skipping unknown element {}", id);
                continue;
            };
            if hidden.contains(id) {
                continue;
            }

            let (parent, parent_bounds) = match element.parent {
                None => (None, None),
                Some(pid) => match slots.get(&pid) {
                    Some(&slot) => (Some(slot), Some(ctx.objects[slot].bounds)),
                    None => match tree.resolve_world_bounds(&pid, ctx.screen) {
                        Ok(bounds) => (None, Some(bounds)),
                        Err(err) => {
                            log::warn!("Skipping element {}: {}", id, err);
                            continue;
                        }
                    },
                },
            };

            let mut object =
                RenderObject::create_from_element(element, parent_bounds.as_ref(), ctx.screen);
            object.parent = parent;
            if ctx.selection.contains(id) {
                object.mark_selected();
            }

            let size = object.bounds.size();
            let dirty = self.dirty_ids.contains(id)
                || self.dirty_regions.iter().any(|r| r.intersects(&object.bounds));
            if dirty {
                ctx.dirty.insert(*id);
            }
            let cached = self.config.enable_caching && self.cache.contains(element, size);
            object.needs_redraw = dirty || !cached;
            object.cache_key = Some(CacheKey::for_element(element, size));

            slots.insert(*id, ctx.objects.len());
            ctx.objects.push(object);
        }
        Ok(PhaseOutcome::Completed(ctx.objects.len()))
    }

    fn sort(ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        if ctx.objects.is_empty() {
            return Ok(PhaseOutcome::Skipped("nothing to sort"));
        }
        let objects = &ctx.objects;
        let mut order: Vec<usize> = (0..objects.len()).collect();
        order.sort_by(|&a, &b| priority_cmp(&objects[a], &objects[b]));
        ctx.layers = LayerGroups::from_sorted(order.iter().map(|&i| (i, objects[i].layer)));
        ctx.order = order;
        Ok(PhaseOutcome::Completed(ctx.order.len()))
    }

    fn optimize(&self, ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        if ctx.order.is_empty() {
            return Ok(PhaseOutcome::Skipped("nothing to optimize"));
        }
        if !self.config.enable_lod && !self.config.enable_batching {
            return Ok(PhaseOutcome::Skipped("lod and batching disabled"));
        }

        if self.config.enable_lod {
            let zoom = ctx.zoom;
            for object in &mut ctx.objects {
                object.lod = (zoom < self.config.lod_zoom_threshold && object.is_complex)
                    || object.screen_max_dimension(zoom) < self.config.lod_min_screen_size;
            }
        }

        if self.config.enable_batching {
            let cap = self.config.batch_size.max(1);
            let mut batches: Vec<Batch> = Vec::new();
            let mut open = false;
            for &i in &ctx.order {
                let object = &mut ctx.objects[i];
                object.batchable = object.is_batchable();
                if !object.batchable {
                    open = false;
                    continue;
                }
                match batches.last_mut() {
                    Some(batch) if open && batch.layer == object.layer && batch.objects.len() < cap => {
                        batch.objects.push(i)
                    }
                    _ => {
                        batches.push(Batch {
                            layer: object.layer,
                            objects: vec![i],
                        });
                        open = true;
                    }
                }
            }
            ctx.batches = batches;
        }
        Ok(PhaseOutcome::Completed(ctx.order.len()))
    }

    fn render<H: RenderHandler>(
        &mut self,
        tree: &ElementTree,
        ctx: &mut FrameContext,
        handler: &mut H,
    ) -> Result<H::Output> {
        let mut visuals = Vec::with_capacity(ctx.order.len());
        for &i in &ctx.order {
            let object = &mut ctx.objects[i];
            let element = tree
                .get(&object.id)
                .ok_or(CoreError::UnknownElement(object.id))?;
            let size = object.bounds.size();

            let visual = if object.lod {
                if ctx.dirty.contains(&object.id) {
                    // The entry predates the change; the next full-detail frame must rebuild.
                    self.cache.invalidate(&object.id);
                }
                lod_visual(element, size)
            } else if self.config.enable_caching {
                let force = ctx.dirty.contains(&object.id);
                let (visual, hit) =
                    self.cache
                        .get_or_render(element, size, force, |e| build_visual(e, size));
                object.is_cached = hit;
                if hit {
                    ctx.cache_hits += 1;
                } else {
                    ctx.cache_misses += 1;
                }
                visual
            } else {
                build_visual(element, size)
            };
            visuals.push(visual);
        }

        let output = {
            let items: Vec<RenderItem<'_>> = ctx
                .order
                .iter()
                .zip(visuals)
                .map(|(&index, visual)| RenderItem {
                    index,
                    object: &ctx.objects[index],
                    visual,
                })
                .collect();
            handler.render(&items, ctx)?
        };
        ctx.rendered = ctx.order.clone();
        Ok(output)
    }

    fn overlay(&mut self, input: &FrameInput<'_>, ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        let viewport = input.viewport;
        let mut overlays = FrameOverlays::default();

        if self.config.grid.enabled {
            overlays.grid = Some(self.grid.render(viewport));
        }
        overlays.rulers = self.grid.rulers(viewport);

        let targets: Vec<SelectionTarget> = ctx
            .sorted_objects()
            .filter(|o| o.selected)
            .filter_map(|o| {
                let element = input.tree.get(&o.id)?;
                let locked = element.flags.locked;
                Some(SelectionTarget {
                    id: o.id,
                    bounds: o.bounds,
                    handles: if locked {
                        HandleMask::NONE
                    } else {
                        element.constraints.resize_handles
                    },
                    rotatable: element.constraints.rotatable && !locked,
                })
            })
            .collect();
        overlays.selection = self.selection.render(&targets, viewport);

        if self.config.debug_mode {
            overlays.debug = ctx
                .sorted_objects()
                .map(|o| {
                    let color = if o.lod { DEBUG_LOD_BOUNDS } else { DEBUG_BOUNDS };
                    Visual::outline(viewport.world_rect_to_screen(&o.bounds), Stroke::dashed(1.0, color))
                })
                .collect();
        }

        let count = overlays.debug.len()
            + overlays.grid.as_ref().map_or(0, GridOverlay::line_count)
            + targets.len();
        ctx.overlays = overlays;
        Ok(PhaseOutcome::Completed(count))
    }

    fn finalize(&mut self, ctx: &mut FrameContext) -> Result<PhaseOutcome> {
        for &i in &ctx.rendered {
            let object = &mut ctx.objects[i];
            object.needs_redraw = false;
            self.dirty_ids.remove(&object.id);
        }
        self.dirty_regions.clear();
        if self.cache.config().ttl_seconds.is_some() {
            let expired = self.cache.cleanup_expired();
            if expired > 0 {
                log::trace!("Expired {} cached visuals", expired);
            }
        }
        Ok(PhaseOutcome::Completed(ctx.rendered.len()))
    }
}
