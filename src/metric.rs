/// Trait defining the distance metric used for tree construction and search.
///
/// The metric is bound statically at index construction, so the per-node
/// distance calls in the search hot path compile to direct calls.
/// Implementations must be symmetric, non-negative, and decomposable as a sum
/// of per-coordinate terms so that [`Metric::axis_distance`] is a valid lower
/// bound for branch-and-bound pruning.
pub trait Metric: Send + Sync {
    /// Full distance between two vectors of equal dimension.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Distance contribution of a single coordinate.
    ///
    /// Used to decide whether the far side of a splitting plane can still
    /// contain a closer point than the current k-th best.
    fn axis_distance(&self, a: f32, b: f32) -> f32;
}

/// Squared Euclidean distance.
///
/// The square root is never taken: rankings are identical and the splitting
/// plane bound stays a plain per-axis term. Reported neighbor distances are
/// therefore squared distances.
#[derive(Clone, Copy, Debug, Default)]
pub struct L2;

impl Metric for L2 {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        let mut sum = 0.0;
        for i in 0..a.len() {
            let d = a[i] - b[i];
            sum += d * d;
        }
        sum
    }

    #[inline]
    fn axis_distance(&self, a: f32, b: f32) -> f32 {
        let d = a - b;
        d * d
    }
}

/// Manhattan (L1) distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct L1;

impl Metric for L1 {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        let mut sum = 0.0;
        for i in 0..a.len() {
            sum += (a[i] - b[i]).abs();
        }
        sum
    }

    #[inline]
    fn axis_distance(&self, a: f32, b: f32) -> f32 {
        (a - b).abs()
    }
}
