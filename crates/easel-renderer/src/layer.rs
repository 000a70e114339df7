use serde::{Deserialize, Serialize};

/// Coarse rendering buckets, in draw order. Layer dominates z-index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    Background,
    Grid,
    Components,
    Effects,
    Selection,
    Handles,
    Guides,
    Overlay,
    Debug,
}

impl Layer {
    pub const ALL: [Layer; 9] = [
        Layer::Background,
        Layer::Grid,
        Layer::Components,
        Layer::Effects,
        Layer::Selection,
        Layer::Handles,
        Layer::Guides,
        Layer::Overlay,
        Layer::Debug,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Layer::Background => "background",
            Layer::Grid => "grid",
            Layer::Components => "components",
            Layer::Effects => "effects",
            Layer::Selection => "selection",
            Layer::Handles => "handles",
            Layer::Guides => "guides",
            Layer::Overlay => "overlay",
            Layer::Debug => "debug",
        }
    }
}

/// Indices into a frame's sorted object list, bucketed by layer. Order inside
/// each bucket is the Sort-phase order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerGroups {
    buckets: Vec<(Layer, Vec<usize>)>,
}

impl LayerGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group a sequence of `(index, layer)` pairs that is already sorted by layer.
    pub fn from_sorted(layers: impl IntoIterator<Item = (usize, Layer)>) -> Self {
        let mut groups = Self::new();
        for (index, layer) in layers {
            groups.push(layer, index);
        }
        groups
    }

    pub fn push(&mut self, layer: Layer, index: usize) {
        match self.buckets.iter_mut().find(|(l, _)| *l == layer) {
            Some((_, objects)) => objects.push(index),
            None => {
                self.buckets.push((layer, vec![index]));
                self.buckets.sort_by_key(|(l, _)| *l);
            }
        }
    }

    pub fn get(&self, layer: Layer) -> &[usize] {
        self.buckets
            .iter()
            .find(|(l, _)| *l == layer)
            .map(|(_, objects)| objects.as_slice())
            .unwrap_or(&[])
    }

    /// Non-empty layers in draw order.
    pub fn iter(&self) -> impl Iterator<Item = (Layer, &[usize])> {
        self.buckets.iter().map(|(l, o)| (*l, o.as_slice()))
    }

    pub fn layer_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn object_count(&self) -> usize {
        self.buckets.iter().map(|(_, o)| o.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
