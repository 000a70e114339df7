use std::collections::HashSet;

use easel_core::{ElementId, Rect, SpatialQuery};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::viewport::ViewportBounds;

/// Default margin around the viewport, in world units.
pub const DEFAULT_CULL_MARGIN: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CullStats {
    pub total: usize,
    pub visible: usize,
    pub culled: usize,
    /// False when no index was available and everything passed.
    pub used_index: bool,
}

impl CullStats {
    pub fn culling_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.culled as f64 / self.total as f64
        }
    }
}

/// Narrows candidate ids to those near the viewport.
#[derive(Debug, Clone)]
pub struct SpatialCuller {
    margin: f64,
    last: CullStats,
}

impl SpatialCuller {
    pub fn new(margin: f64) -> Self {
        Self {
            margin: if margin.is_finite() { margin.max(0.0) } else { DEFAULT_CULL_MARGIN },
            last: CullStats::default(),
        }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// The region queried for a given viewport.
    pub fn query_region(&self, bounds: &ViewportBounds) -> Rect {
        bounds.to_rect().expand(self.margin)
    }

    /// Filter `candidates` to those the index reports inside the expanded
    /// viewport. Candidate order is preserved; with no index every candidate
    /// passes.
    ///
    /// `candidates` must cover every id the index can report. A hit outside
    /// it means the index is stale and yields [`RenderError::StaleIndex`].
    pub fn cull(
        &mut self,
        bounds: &ViewportBounds,
        index: Option<&dyn SpatialQuery>,
        candidates: &[ElementId],
    ) -> Result<Vec<ElementId>> {
        let visible: Vec<ElementId> = match index {
            Some(index) => {
                let hits: HashSet<ElementId> =
                    index.query_region(&self.query_region(bounds)).into_iter().collect();
                let visible: Vec<ElementId> = candidates
                    .iter()
                    .filter(|id| hits.contains(id))
                    .copied()
                    .collect();
                if visible.len() != hits.len() {
                    let known: HashSet<&ElementId> = candidates.iter().collect();
                    if let Some(stale) = hits.iter().find(|id| !known.contains(id)) {
                        return Err(RenderError::StaleIndex(*stale));
                    }
                }
                visible
            }
            None => candidates.to_vec(),
        };

        self.last = CullStats {
            total: candidates.len(),
            visible: visible.len(),
            culled: candidates.len() - visible.len(),
            used_index: index.is_some(),
        };
        log::trace!(
            "Culled {}/{} elements",
            self.last.culled,
            self.last.total
        );
        Ok(visible)
    }

    pub fn last_stats(&self) -> CullStats {
        self.last
    }
}

impl Default for SpatialCuller {
    fn default() -> Self {
        Self::new(DEFAULT_CULL_MARGIN)
    }
}
