use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::error::{KnnError, Result};
use crate::imbalance::{self, CandidateQueue};
use crate::metric::Metric;
use crate::results::ResultSet;
use crate::source::PointSource;
use crate::tree::Tree;

/// Construction-time knobs of a [`ProgressiveIndex`].
#[derive(Clone, Copy, Debug)]
pub struct IndexParams {
    /// Leaf bucket capacity, and the fan-out granularity of rebuilds.
    pub branching_factor: usize,
    /// Subtrees whose imbalance ratio exceeds this become rebuild candidates.
    pub imbalance_threshold: f32,
}

impl IndexParams {
    pub fn new(branching_factor: usize) -> IndexParams {
        IndexParams {
            branching_factor,
            imbalance_threshold: 1.2,
        }
    }

    pub fn with_threshold(mut self, imbalance_threshold: f32) -> IndexParams {
        self.imbalance_threshold = imbalance_threshold;
        self
    }
}

impl Default for IndexParams {
    fn default() -> IndexParams {
        IndexParams::new(4)
    }
}

/// Per-call knobs of [`ProgressiveIndex::knn_search`].
#[derive(Clone, Copy, Debug)]
pub struct SearchParams {
    /// Node visits allowed per query; `usize::MAX` makes the search exact.
    pub checks: usize,
    /// Worker threads for the batch. `0` runs on the ambient rayon pool.
    pub cores: usize,
}

impl SearchParams {
    pub fn new(checks: usize) -> SearchParams {
        SearchParams { checks, cores: 1 }
    }

    /// An unbudgeted, exact search over the given number of workers.
    pub fn exact(cores: usize) -> SearchParams {
        SearchParams {
            checks: usize::MAX,
            cores,
        }
    }
}

impl Default for SearchParams {
    fn default() -> SearchParams {
        SearchParams::exact(1)
    }
}

/// An online k-d tree over a growing point source.
///
/// Points are pulled from the source in id order by [`add_points`], each in
/// O(depth) without any restructuring beyond dividing the landing bucket.
/// The structural debt this accrues is observable through the imbalance
/// accessors and paid down by [`update`], which rebuilds the worst subtrees
/// it can afford within an explicit operation budget. Search cost is capped
/// per query through [`SearchParams::checks`].
///
/// [`add_points`]: ProgressiveIndex::add_points
/// [`update`]: ProgressiveIndex::update
pub struct ProgressiveIndex<M: Metric, S: PointSource> {
    source: S,
    metric: M,
    tree: Tree,
    queue: CandidateQueue,
    params: IndexParams,
    cursor: usize,
}

impl<M: Metric, S: PointSource> ProgressiveIndex<M, S> {
    pub fn new(source: S, metric: M, params: IndexParams) -> Result<ProgressiveIndex<M, S>> {
        if params.branching_factor < 2 {
            return Err(KnnError::InvalidParameter(format!(
                "branching factor must be at least 2, got {}",
                params.branching_factor
            )));
        }
        if !(params.imbalance_threshold >= 1.0) {
            return Err(KnnError::InvalidParameter(format!(
                "imbalance threshold must be at least 1.0, got {}",
                params.imbalance_threshold
            )));
        }
        if source.dim() == 0 {
            return Err(KnnError::InvalidParameter(
                "point dimension must be at least 1".to_string(),
            ));
        }
        let tree = Tree::new(params.branching_factor);
        Ok(ProgressiveIndex {
            source,
            metric,
            tree,
            queue: CandidateQueue::new(),
            params,
            cursor: 0,
        })
    }

    /// Pulls up to `count` unseen points from the source into the tree and
    /// returns how many went in. A drained source yields 0. Subtrees an
    /// insertion tips past the imbalance threshold join the maintenance
    /// queue for [`update`](ProgressiveIndex::update).
    pub fn add_points(&mut self, count: usize) -> usize {
        let available = self.source.count() - self.cursor;
        let take = count.min(available);
        let mut path = Vec::new();
        for _ in 0..take {
            self.tree.insert(&self.source, self.cursor as u32, &mut path);
            self.queue
                .offer_path(&mut self.tree, &path, self.params.imbalance_threshold);
            self.cursor += 1;
        }
        take
    }

    /// Spends up to `budget` operations rebuilding the most imbalanced
    /// queued subtrees, worst first, and returns the operations actually
    /// spent. One operation moves one point, so a candidate is taken only
    /// when its whole subtree still fits in the remaining budget; one too
    /// rich for this call keeps its place in the queue. Never exceeds
    /// `budget`.
    pub fn update(&mut self, budget: usize) -> usize {
        if budget == 0 {
            return 0;
        }
        let mut spent = 0;
        let mut deferred = Vec::new();
        while let Some(candidate) = self
            .queue
            .pop_current(&mut self.tree, self.params.imbalance_threshold)
        {
            if candidate.size as usize > budget - spent {
                deferred.push(candidate);
                continue;
            }
            spent += self.tree.rebuild(&self.source, candidate.slot);
            if spent >= budget {
                break;
            }
        }
        for candidate in deferred {
            self.queue.requeue(&mut self.tree, candidate);
        }
        spent
    }

    /// Refreshes every stale subtree ratio, then reports the worst ratio per
    /// tree level, root first. Empty until the root has split at least once.
    pub fn recompute_imbalances(&mut self) -> Vec<f32> {
        imbalance::refresh(&mut self.tree);
        imbalance::level_ratios(&self.tree)
    }

    /// The per-level ratios as currently cached, without refreshing anything.
    pub fn cached_imbalances(&self) -> Vec<f32> {
        imbalance::level_ratios(&self.tree)
    }

    /// Depth of the deepest leaf, the root sitting at depth zero.
    pub fn compute_max_depth(&self) -> usize {
        self.tree.max_depth()
    }

    /// Leaf depth -> points stored at that depth. Values sum to
    /// [`points_indexed`](ProgressiveIndex::points_indexed).
    pub fn compute_count_distribution(&self) -> BTreeMap<usize, usize> {
        self.tree.count_distribution()
    }

    /// Finds the `k` nearest indexed points for each query in a flat
    /// row-major batch, filling one [`ResultSet`] per query. With a finite
    /// check budget a set may come back holding fewer than `k` neighbors.
    pub fn knn_search(
        &self,
        queries: &[f32],
        results: &mut Vec<ResultSet>,
        k: usize,
        params: &SearchParams,
    ) -> Result<()> {
        if k == 0 {
            return Err(KnnError::InvalidParameter(
                "k must be at least 1".to_string(),
            ));
        }
        if queries.is_empty() {
            return Err(KnnError::EmptyQuery);
        }
        let dim = self.source.dim();
        if queries.len() % dim != 0 {
            return Err(KnnError::DimensionMismatch {
                values: queries.len(),
                dim,
            });
        }

        let count = queries.len() / dim;
        results.clear();
        results.resize_with(count, || ResultSet::new(k));

        let mut run = || {
            queries
                .par_chunks(dim)
                .zip(results.par_iter_mut())
                .for_each(|(query, set)| {
                    self.tree
                        .knn(&self.source, &self.metric, query, set, params.checks);
                });
        };

        if params.cores == 0 {
            run();
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(params.cores)
                .build()
                .map_err(|e| KnnError::ThreadPool(e.to_string()))?;
            pool.install(run);
        }
        Ok(())
    }

    /// Points inserted so far.
    pub fn points_indexed(&self) -> usize {
        self.cursor
    }

    /// Points the source holds that the tree has not seen yet.
    pub fn points_pending(&self) -> usize {
        self.source.count() - self.cursor
    }

    pub fn dim(&self) -> usize {
        self.source.dim()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The source can keep growing behind the index; appended points become
    /// visible to [`add_points`](ProgressiveIndex::add_points).
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;
    use crate::source::VecSource;

    #[test]
    fn test_rejects_degenerate_branching() {
        for branching in [0, 1] {
            let params = IndexParams::new(branching);
            let result = ProgressiveIndex::new(VecSource::new(2).unwrap(), L2, params);
            assert!(result.is_err(), "branching factor {} accepted", branching);
        }
    }

    #[test]
    fn test_rejects_threshold_below_one() {
        let params = IndexParams::new(4).with_threshold(0.8);
        assert!(ProgressiveIndex::new(VecSource::new(2).unwrap(), L2, params).is_err());
        let params = IndexParams::new(4).with_threshold(f32::NAN);
        assert!(ProgressiveIndex::new(VecSource::new(2).unwrap(), L2, params).is_err());
    }

    #[test]
    fn test_rejects_zero_dimension() {
        struct Dimensionless;

        impl PointSource for Dimensionless {
            fn dim(&self) -> usize {
                0
            }
            fn count(&self) -> usize {
                0
            }
            fn get(&self, _point: usize, _coord: usize) -> f32 {
                0.0
            }
            fn point(&self, _index: usize) -> &[f32] {
                &[]
            }
        }

        let result = ProgressiveIndex::new(Dimensionless, L2, IndexParams::new(4));
        assert!(result.is_err());
    }

    #[test]
    fn test_add_points_stops_at_the_source_end() {
        let source = VecSource::random(10, 2).unwrap();
        let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();

        assert_eq!(index.add_points(7), 7);
        assert_eq!(index.points_indexed(), 7);
        assert_eq!(index.points_pending(), 3);
        assert_eq!(index.add_points(7), 3);
        assert_eq!(index.add_points(7), 0);
        assert_eq!(index.points_pending(), 0);
    }

    #[test]
    fn test_feeding_the_source_extends_the_stream() {
        let source = VecSource::new(2).unwrap();
        let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
        assert_eq!(index.add_points(5), 0);

        index.source_mut().feed(&[0.0, 0.0, 1.0, 1.0]);
        assert_eq!(index.add_points(5), 2);
        assert_eq!(index.points_indexed(), 2);
    }

    #[test]
    fn test_update_on_an_empty_index_spends_nothing() {
        let source = VecSource::new(3).unwrap();
        let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
        assert_eq!(index.update(1000), 0);
        assert_eq!(index.update(0), 0);
    }

    #[test]
    fn test_search_argument_validation() {
        let source = VecSource::random(20, 3).unwrap();
        let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
        index.add_points(20);

        let mut results = Vec::new();
        let err = index
            .knn_search(&[0.5, 0.5, 0.5], &mut results, 0, &SearchParams::exact(1))
            .unwrap_err();
        assert!(matches!(err, KnnError::InvalidParameter(_)));

        let err = index
            .knn_search(&[], &mut results, 3, &SearchParams::exact(1))
            .unwrap_err();
        assert!(matches!(err, KnnError::EmptyQuery));

        let err = index
            .knn_search(&[0.5, 0.5], &mut results, 3, &SearchParams::exact(1))
            .unwrap_err();
        assert!(matches!(err, KnnError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_search_on_the_ambient_pool() {
        let source = VecSource::random(64, 2).unwrap();
        let mut index = ProgressiveIndex::new(source, L2, IndexParams::new(4)).unwrap();
        index.add_points(64);

        let mut results = Vec::new();
        index
            .knn_search(&[0.5, 0.5], &mut results, 3, &SearchParams::exact(0))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 3);
    }
}
