use crate::index::{IndexParams, ProgressiveIndex, SearchParams};
use crate::metric::L2;
use crate::results::ResultSet;
use crate::source::VecSource;
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_rayon::init_thread_pool;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init_threads(n: usize) -> js_sys::Promise {
    init_thread_pool(n)
}

// --- Progressive index ---

/// WASM wrapper over a squared-Euclidean progressive index fed from JS.
///
/// Search results stay inside the wrapper; the flat getters hand them to JS
/// without per-neighbor objects.
#[wasm_bindgen(js_name = ProgressiveIndex)]
pub struct ProgressiveIndexWASM {
    inner: ProgressiveIndex<L2, VecSource>,
    results: Vec<ResultSet>,
}

#[wasm_bindgen(js_class = ProgressiveIndex)]
impl ProgressiveIndexWASM {
    #[wasm_bindgen(constructor)]
    pub fn new(
        dim: usize,
        branching_factor: usize,
        imbalance_threshold: f32,
    ) -> Result<ProgressiveIndexWASM, JsValue> {
        let params = IndexParams::new(branching_factor).with_threshold(imbalance_threshold);
        let source = VecSource::new(dim).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let inner = ProgressiveIndex::new(source, L2, params)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(ProgressiveIndexWASM {
            inner,
            results: Vec::new(),
        })
    }

    /// Appends vectors to the backing source; a trailing partial vector is
    /// ignored. Fed points wait until `add_points` pulls them in.
    pub fn feed(&mut self, points: &[f32]) {
        self.inner.source_mut().feed(points);
    }

    pub fn random_points(&mut self, count: usize) {
        self.inner.source_mut().feed_random(count);
    }

    pub fn add_points(&mut self, count: usize) -> usize {
        self.inner.add_points(count)
    }

    pub fn update(&mut self, ops: usize) -> usize {
        self.inner.update(ops)
    }

    pub fn knn_search(&mut self, queries: &[f32], k: usize, checks: usize) -> Result<(), JsValue> {
        // Cores are whatever init_threads set up; no per-call pool here
        let params = SearchParams { checks, cores: 0 };
        self.inner
            .knn_search(queries, &mut self.results, k, &params)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn knn_search_exact(&mut self, queries: &[f32], k: usize) -> Result<(), JsValue> {
        self.knn_search(queries, k, usize::MAX)
    }

    /// Neighbor ids of the last search, query after query. Rows can be
    /// shorter than k under a tight check budget; see `result_counts`.
    #[wasm_bindgen(getter)]
    pub fn neighbor_ids(&self) -> Vec<u32> {
        self.results
            .iter()
            .flat_map(|set| set.iter().map(|n| n.id as u32))
            .collect()
    }

    #[wasm_bindgen(getter)]
    pub fn neighbor_distances(&self) -> Vec<f32> {
        self.results
            .iter()
            .flat_map(|set| set.iter().map(|n| n.dist))
            .collect()
    }

    /// Neighbors found per query in the last search.
    #[wasm_bindgen(getter)]
    pub fn result_counts(&self) -> Vec<u32> {
        self.results.iter().map(|set| set.len() as u32).collect()
    }

    pub fn recompute_imbalances(&mut self) -> Vec<f32> {
        self.inner.recompute_imbalances()
    }

    #[wasm_bindgen(getter)]
    pub fn cached_imbalances(&self) -> Vec<f32> {
        self.inner.cached_imbalances()
    }

    #[wasm_bindgen(getter)]
    pub fn max_depth(&self) -> usize {
        self.inner.compute_max_depth()
    }

    /// The leaf depth histogram flattened to `[depth, count, ...]` pairs.
    pub fn count_distribution(&self) -> Vec<u32> {
        let mut flat = Vec::new();
        for (depth, count) in self.inner.compute_count_distribution() {
            flat.push(depth as u32);
            flat.push(count as u32);
        }
        flat
    }

    #[wasm_bindgen(getter)]
    pub fn points_indexed(&self) -> usize {
        self.inner.points_indexed()
    }

    #[wasm_bindgen(getter)]
    pub fn points_pending(&self) -> usize {
        self.inner.points_pending()
    }

    #[wasm_bindgen(getter)]
    pub fn dim(&self) -> usize {
        self.inner.dim()
    }
}
