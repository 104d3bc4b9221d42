//! Optimistic layers on top of the confirmed cache.
//!
//! Confirmed data (query results, mutation results, subscription payloads)
//! is written to the base cache. Provisional patches are kept as an ordered
//! list of layers and replayed over a copy of the base to produce the view
//! readers see. Dropping a layer therefore leaves exactly what confirmed data
//! implies, with no inverse patch to get wrong.

use crate::cache::patch::CachePatch;
use crate::cache::store::NormalizedCache;
use log::debug;

pub type LayerId = u64;

#[derive(Debug, Clone)]
struct Layer {
    id: LayerId,
    patch: CachePatch,
}

#[derive(Debug, Default)]
pub struct LayeredCache {
    base: NormalizedCache,
    layers: Vec<Layer>,
    /// Base with all layers replayed. Only meaningful while layers exist.
    view: NormalizedCache,
    next_layer: LayerId,
}

impl LayeredCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache as readers should see it, optimistic layers included.
    pub fn view(&self) -> &NormalizedCache {
        if self.layers.is_empty() {
            &self.base
        } else {
            &self.view
        }
    }

    /// Confirmed data only.
    pub fn base(&self) -> &NormalizedCache {
        &self.base
    }

    pub fn pending_layers(&self) -> usize {
        self.layers.len()
    }

    /// Applies a confirmed patch.
    pub fn apply(&mut self, patch: &CachePatch) {
        self.base.apply(patch);
        self.rebuild();
    }

    /// Runs a confirmed write (e.g. storing a query result) against the base.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut NormalizedCache) -> R) -> R {
        let result = f(&mut self.base);
        self.rebuild();
        result
    }

    /// Layers a provisional patch over the confirmed cache.
    pub fn push_optimistic(&mut self, patch: CachePatch) -> LayerId {
        let id = self.next_layer;
        self.next_layer += 1;
        if self.layers.is_empty() {
            self.view = self.base.clone();
        }
        self.view.apply(&patch);
        self.layers.push(Layer { id, patch });
        debug!("Pushed optimistic layer {id}");
        id
    }

    /// Replaces a provisional layer with the confirmed patch in one step.
    pub fn commit(&mut self, layer: LayerId, patch: &CachePatch) {
        self.drop_layer(layer);
        self.base.apply(patch);
        self.rebuild();
    }

    /// Discards a provisional layer.
    pub fn rollback(&mut self, layer: LayerId) {
        self.drop_layer(layer);
        self.rebuild();
    }

    fn drop_layer(&mut self, layer: LayerId) {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != layer);
        if self.layers.len() == before {
            debug!("Optimistic layer {layer} was already gone");
        }
    }

    fn rebuild(&mut self) {
        if self.layers.is_empty() {
            self.view = NormalizedCache::default();
            return;
        }
        let mut view = self.base.clone();
        for layer in &self.layers {
            view.apply(&layer.patch);
        }
        self.view = view;
    }
}
