use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementId};
use crate::error::{CoreError, Result};
use crate::geometry::{Rect, Size};
use crate::layout::resolve_bounds;

/// Snapshot of the canvas element hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementTree {
    /// All elements indexed by ID.
    elements: HashMap<ElementId, Element>,
    /// Top-level elements in insertion order.
    roots: Vec<ElementId>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Element management ───────────────────────────────────────────

    /// Insert an element, appending it to `parent`'s children or to the roots.
    ///
    /// Any child ids already listed on the element are discarded; children
    /// are attached by inserting them with this element as their parent.
    pub fn insert(&mut self, mut element: Element, parent: Option<ElementId>) -> Result<ElementId> {
        let id = element.id;
        if self.elements.contains_key(&id) {
            return Err(CoreError::DuplicateElement(id));
        }
        match parent {
            Some(parent_id) => {
                let parent = self
                    .elements
                    .get_mut(&parent_id)
                    .ok_or(CoreError::UnknownParent(parent_id))?;
                parent.children.push(id);
            }
            None => self.roots.push(id),
        }
        element.parent = parent;
        element.children.clear();
        self.elements.insert(id, element);
        Ok(id)
    }

    /// Remove an element and its whole subtree. Returns the removed element.
    pub fn remove(&mut self, id: &ElementId) -> Result<Element> {
        let parent = self
            .elements
            .get(id)
            .ok_or(CoreError::UnknownElement(*id))?
            .parent;
        match parent.and_then(|p| self.elements.get_mut(&p)) {
            Some(p) => p.children.retain(|c| c != id),
            None => self.roots.retain(|r| r != id),
        }

        let mut stack: Vec<ElementId> = self
            .elements
            .get(id)
            .map(|e| e.children.clone())
            .unwrap_or_default();
        let mut descendants = 0usize;
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.elements.remove(&child) {
                descendants += 1;
                stack.extend(removed.children);
            }
        }
        log::trace!("Removed element {} with {} descendants", id, descendants);
        self.elements.remove(id).ok_or(CoreError::UnknownElement(*id))
    }

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn get_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    pub fn children(&self, id: &ElementId) -> &[ElementId] {
        self.elements
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_of(&self, id: &ElementId) -> Option<ElementId> {
        self.elements.get(id).and_then(|e| e.parent)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Depth-first order: roots in insertion order, children in list order.
    pub fn preorder(&self) -> Vec<ElementId> {
        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack: Vec<ElementId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(element) = self.elements.get(&id) {
                order.push(id);
                stack.extend(element.children.iter().rev().copied());
            }
        }
        order
    }

    // ── Bounds ───────────────────────────────────────────────────────

    /// World bounds of one element, resolving its ancestor chain top-down.
    pub fn resolve_world_bounds(&self, id: &ElementId, reference: Size) -> Result<Rect> {
        let mut chain = Vec::new();
        let mut cursor = Some(*id);
        while let Some(current) = cursor {
            let element = self
                .elements
                .get(&current)
                .ok_or(CoreError::UnknownElement(current))?;
            chain.push(element);
            cursor = element.parent;
        }

        let mut bounds: Option<Rect> = None;
        for element in chain.iter().rev() {
            bounds = Some(resolve_bounds(element, bounds.as_ref(), reference));
        }
        bounds.ok_or(CoreError::UnknownElement(*id))
    }

    /// World bounds of every element, in preorder.
    pub fn world_bounds_all(&self, reference: Size) -> Vec<(ElementId, Rect)> {
        let mut resolved: HashMap<ElementId, Rect> = HashMap::with_capacity(self.elements.len());
        let mut out = Vec::with_capacity(self.elements.len());
        for id in self.preorder() {
            let Some(element) = self.elements.get(&id) else {
                continue;
            };
            let parent = element.parent.and_then(|p| resolved.get(&p)).copied();
            let bounds = resolve_bounds(element, parent.as_ref(), reference);
            resolved.insert(id, bounds);
            out.push((id, bounds));
        }
        out
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a snapshot, rejecting cycles and inconsistent parent links.
    pub fn from_json(json: &str) -> Result<Self> {
        let tree: Self = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }

    /// Check that parent and child links agree, roots have no parent, and
    /// every element is reachable from exactly one root path.
    pub fn validate(&self) -> Result<()> {
        let malformed = |id: ElementId, reason| Err(CoreError::MalformedTree { id, reason });

        for (id, element) in &self.elements {
            if element.id != *id {
                return malformed(*id, "stored under a different id");
            }
            if let Some(parent) = element.parent {
                let Some(p) = self.elements.get(&parent) else {
                    return malformed(*id, "parent does not exist");
                };
                if !p.children.contains(id) {
                    return malformed(*id, "parent does not list it as a child");
                }
            }
            for child in &element.children {
                match self.elements.get(child) {
                    Some(c) if c.parent == Some(*id) => {}
                    Some(_) => return malformed(*child, "child points at another parent"),
                    None => return malformed(*id, "child does not exist"),
                }
            }
        }

        let mut seen: HashSet<ElementId> = HashSet::with_capacity(self.elements.len());
        let mut stack: Vec<ElementId> = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            match self.elements.get(root) {
                Some(element) if element.parent.is_none() => stack.push(*root),
                Some(_) => return malformed(*root, "root has a parent"),
                None => return malformed(*root, "root does not exist"),
            }
        }
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return malformed(id, "reached twice, the hierarchy has a cycle");
            }
            stack.extend(self.children(&id).iter().copied());
        }
        if let Some(orphan) = self.elements.keys().find(|id| !seen.contains(id)) {
            return malformed(*orphan, "not reachable from any root");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Dimension, ElementKind};

    const SCREEN: Size = Size {
        width: 1000.0,
        height: 1000.0,
    };

    #[test]
    fn test_tree_create() {
        let tree = ElementTree::new();
        assert!(tree.is_empty());
        assert!(tree.preorder().is_empty());
    }

    #[test]
    fn test_insert_and_preorder() {
        let mut tree = ElementTree::new();
        let a = tree.insert(Element::new("a", ElementKind::Container), None).unwrap();
        let b = tree.insert(Element::new("b", ElementKind::Container), None).unwrap();
        let a1 = tree.insert(Element::new("a1", ElementKind::text("x")), Some(a)).unwrap();
        let a2 = tree.insert(Element::new("a2", ElementKind::text("y")), Some(a)).unwrap();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.preorder(), vec![a, a1, a2, b]);
        assert_eq!(tree.parent_of(&a2), Some(a));
        assert_eq!(tree.children(&a), &[a1, a2]);
    }

    #[test]
    fn test_insert_errors() {
        let mut tree = ElementTree::new();
        let el = Element::new("a", ElementKind::Container);
        let dup = el.clone();
        tree.insert(el, None).unwrap();
        assert!(matches!(tree.insert(dup, None), Err(CoreError::DuplicateElement(_))));

        let orphan = Element::new("o", ElementKind::Container);
        let missing = uuid::Uuid::new_v4();
        assert!(matches!(
            tree.insert(orphan, Some(missing)),
            Err(CoreError::UnknownParent(_))
        ));
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = ElementTree::new();
        let a = tree.insert(Element::new("a", ElementKind::Container), None).unwrap();
        let a1 = tree.insert(Element::new("a1", ElementKind::Container), Some(a)).unwrap();
        tree.insert(Element::new("a1x", ElementKind::text("deep")), Some(a1)).unwrap();
        let b = tree.insert(Element::new("b", ElementKind::Container), None).unwrap();

        tree.remove(&a).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.roots(), &[b]);
        assert!(tree.remove(&a).is_err());
    }

    #[test]
    fn test_world_bounds_chain() {
        let mut tree = ElementTree::new();
        let parent = tree
            .insert(
                Element::new("p", ElementKind::Container).with_frame(100.0, 100.0, 400.0, 400.0),
                None,
            )
            .unwrap();
        let child = tree
            .insert(
                Element::new("c", ElementKind::Container)
                    .with_position(Dimension::Px(10.0), Dimension::Percent(50.0))
                    .with_size(Dimension::Percent(25.0), Dimension::Px(20.0)),
                Some(parent),
            )
            .unwrap();

        let bounds = tree.resolve_world_bounds(&child, SCREEN).unwrap();
        assert_eq!(bounds, Rect::new(110.0, 300.0, 100.0, 20.0));

        let all = tree.world_bounds_all(SCREEN);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], (child, bounds));
    }

    #[test]
    fn test_json_round_trip_keeps_structure() {
        let mut tree = ElementTree::new();
        let a = tree.insert(Element::new("a", ElementKind::Container), None).unwrap();
        let a1 = tree.insert(Element::new("a1", ElementKind::text("t")), Some(a)).unwrap();
        let json = tree.to_json().unwrap();
        let back = ElementTree::from_json(&json).unwrap();
        assert_eq!(back.preorder(), vec![a, a1]);
    }

    fn rewire(tree: &ElementTree, edit: impl FnOnce(&mut serde_json::Value)) -> Result<ElementTree> {
        let mut value = serde_json::to_value(tree).unwrap();
        edit(&mut value);
        ElementTree::from_json(&value.to_string())
    }

    #[test]
    fn test_from_json_rejects_self_cycle() {
        let mut tree = ElementTree::new();
        let a = tree.insert(Element::new("a", ElementKind::Container), None).unwrap();
        let key = a.to_string();
        let err = rewire(&tree, |v| {
            v["elements"][&key]["children"] = serde_json::json!([key.clone()]);
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedTree { id, .. } if id == a));
    }

    #[test]
    fn test_from_json_rejects_parent_cycle() {
        let mut tree = ElementTree::new();
        let a = tree.insert(Element::new("a", ElementKind::Container), None).unwrap();
        let b = tree.insert(Element::new("b", ElementKind::Container), Some(a)).unwrap();
        let (ka, kb) = (a.to_string(), b.to_string());
        let err = rewire(&tree, |v| {
            v["roots"] = serde_json::json!([]);
            v["elements"][&ka]["parent"] = serde_json::json!(kb.clone());
            v["elements"][&kb]["children"] = serde_json::json!([ka.clone()]);
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedTree { .. }));
    }

    #[test]
    fn test_from_json_rejects_mismatched_links() {
        let mut tree = ElementTree::new();
        let a = tree.insert(Element::new("a", ElementKind::Container), None).unwrap();
        let b = tree.insert(Element::new("b", ElementKind::Container), None).unwrap();
        let (ka, kb) = (a.to_string(), b.to_string());
        let err = rewire(&tree, |v| {
            v["elements"][&ka]["children"] = serde_json::json!([kb.clone()]);
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedTree { id, .. } if id == b));
    }
}
