use std::collections::HashMap;

use rstar::{RTree, RTreeObject, AABB};

use crate::element::ElementId;
use crate::geometry::{Point, Rect, Size};
use crate::tree::ElementTree;

/// Region and point queries over element bounds.
///
/// The renderer only depends on this trait, so hosts may bring their own index.
pub trait SpatialQuery {
    /// Ids of every element whose bounds intersect `region`.
    fn query_region(&self, region: &Rect) -> Vec<ElementId>;
    /// Ids of every element whose bounds contain `point`.
    fn query_point(&self, point: Point) -> Vec<ElementId>;
}

/// An entry in the R-tree spatial index.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry {
    pub id: ElementId,
    pub bounds: Rect,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.bounds)
    }
}

fn envelope_of(rect: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.x, rect.y], [rect.right(), rect.bottom()])
}

/// R-tree backed index for viewport culling and hit testing.
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
    /// Current bounds per id, needed for exact removal.
    bounds: HashMap<ElementId, Rect>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self {
            tree: RTree::new(),
            bounds: HashMap::new(),
        }
    }

    /// Build the index from a list of entries.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        let bounds = entries.iter().map(|e| (e.id, e.bounds)).collect();
        Self {
            tree: RTree::bulk_load(entries),
            bounds,
        }
    }

    /// Index every element of a tree at its resolved world bounds.
    pub fn from_tree(tree: &ElementTree, reference: Size) -> Self {
        let entries = tree
            .world_bounds_all(reference)
            .into_iter()
            .map(|(id, bounds)| SpatialEntry { id, bounds })
            .collect::<Vec<_>>();
        log::debug!("Indexing {} elements", entries.len());
        Self::build(entries)
    }

    /// Insert an entry, replacing any previous bounds for the same id.
    pub fn insert(&mut self, id: ElementId, bounds: Rect) {
        self.remove(&id);
        self.tree.insert(SpatialEntry { id, bounds });
        self.bounds.insert(id, bounds);
    }

    pub fn remove(&mut self, id: &ElementId) -> bool {
        match self.bounds.remove(id) {
            Some(bounds) => self
                .tree
                .remove(&SpatialEntry { id: *id, bounds })
                .is_some(),
            None => false,
        }
    }

    /// Move an element to new bounds.
    pub fn update(&mut self, id: ElementId, bounds: Rect) {
        self.insert(id, bounds);
    }

    pub fn bounds_of(&self, id: &ElementId) -> Option<Rect> {
        self.bounds.get(id).copied()
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.bounds.clear();
    }
}

impl SpatialQuery for SpatialIndex {
    fn query_region(&self, region: &Rect) -> Vec<ElementId> {
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(region))
            .map(|e| e.id)
            .collect()
    }

    fn query_point(&self, point: Point) -> Vec<ElementId> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([point.x, point.y]))
            .map(|e| e.id)
            .collect()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_spatial_query() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let index = SpatialIndex::build(vec![
            SpatialEntry {
                id: first,
                bounds: Rect::new(0.0, 0.0, 10.0, 10.0),
            },
            SpatialEntry {
                id: second,
                bounds: Rect::new(20.0, 20.0, 10.0, 10.0),
            },
        ]);

        // Point inside first entry
        assert_eq!(index.query_point(Point::new(5.0, 5.0)), vec![first]);

        // Point inside second entry
        assert_eq!(index.query_point(Point::new(25.0, 25.0)), vec![second]);

        // Region query
        let results = index.query_region(&Rect::new(-5.0, -5.0, 20.0, 20.0));
        assert_eq!(results, vec![first]);
    }

    #[test]
    fn test_update_and_remove() {
        let id = Uuid::new_v4();
        let mut index = SpatialIndex::new();
        index.insert(id, Rect::new(0.0, 0.0, 10.0, 10.0));
        index.update(id, Rect::new(500.0, 500.0, 10.0, 10.0));
        assert_eq!(index.len(), 1);
        assert!(index.query_point(Point::new(5.0, 5.0)).is_empty());
        assert_eq!(index.query_point(Point::new(505.0, 505.0)), vec![id]);

        assert!(index.remove(&id));
        assert!(!index.remove(&id));
        assert!(index.is_empty());
    }

    #[test]
    fn test_point_on_edge_and_overlap() {
        let outer = Uuid::new_v4();
        let inner = Uuid::new_v4();
        let index = SpatialIndex::build(vec![
            SpatialEntry {
                id: outer,
                bounds: Rect::new(0.0, 0.0, 100.0, 100.0),
            },
            SpatialEntry {
                id: inner,
                bounds: Rect::new(40.0, 40.0, 20.0, 20.0),
            },
        ]);

        let mut hits = index.query_point(Point::new(50.0, 50.0));
        hits.sort();
        let mut expected = vec![outer, inner];
        expected.sort();
        assert_eq!(hits, expected);

        assert_eq!(index.query_point(Point::new(100.0, 0.0)), vec![outer]);
        assert!(index.query_point(Point::new(100.5, 50.0)).is_empty());
    }
}
