use std::collections::BTreeMap;

use crate::metric::Metric;
use crate::results::ResultSet;
use crate::source::PointSource;

pub(crate) const NONE: u32 = u32::MAX;

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) split_dim: u32,
    pub(crate) split_val: f32,
    pub(crate) left: u32, // NONE if leaf
    pub(crate) right: u32,
    // Points in this subtree; equals bucket.len() for leaves
    pub(crate) size: u32,
    pub(crate) ratio: f32,
    pub(crate) stale: bool,
    // Set while the maintenance queue holds a live entry for this node
    pub(crate) queued: bool,
    pub(crate) generation: u32,
    // Leaf data: point ids in arrival order
    pub(crate) bucket: Vec<u32>,
}

/// The online k-d tree. Nodes live in a flat arena addressed by `u32` slots;
/// freed slots are recycled through a free list and carry a generation
/// counter so queued references to a demolished subtree can be recognized.
pub(crate) struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: u32,
    pub(crate) leaf_capacity: usize,
    free: Vec<u32>,
}

/// max(l, r) / ((l + r) / 2). 1.0 for a perfectly even split.
pub(crate) fn subtree_ratio(left: u32, right: u32) -> f32 {
    let l = left as f32;
    let r = right as f32;
    2.0 * l.max(r) / (l + r)
}

impl Tree {
    pub(crate) fn new(leaf_capacity: usize) -> Tree {
        Tree {
            nodes: Vec::new(),
            root: NONE,
            leaf_capacity,
            free: Vec::new(),
        }
    }

    /// Points held by the tree.
    #[cfg(test)]
    pub(crate) fn size(&self) -> usize {
        if self.root == NONE {
            0
        } else {
            self.nodes[self.root as usize].size as usize
        }
    }

    fn alloc(&mut self, node: Node) -> u32 {
        if let Some(slot) = self.free.pop() {
            // The generation was bumped when the slot was released
            let generation = self.nodes[slot as usize].generation;
            self.nodes[slot as usize] = Node { generation, ..node };
            slot
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn alloc_leaf(&mut self, bucket: Vec<u32>) -> u32 {
        let size = bucket.len() as u32;
        self.alloc(Node {
            split_dim: 0,
            split_val: 0.0,
            left: NONE,
            right: NONE,
            size,
            ratio: 1.0,
            stale: false,
            queued: false,
            generation: 0,
            bucket,
        })
    }

    fn release(&mut self, slot: u32) {
        let node = &mut self.nodes[slot as usize];
        node.generation += 1;
        node.left = NONE;
        node.right = NONE;
        node.size = 0;
        node.ratio = 1.0;
        node.stale = false;
        node.queued = false;
        node.bucket = Vec::new();
        self.free.push(slot);
    }

    fn release_subtree(&mut self, slot: u32) {
        if slot == NONE {
            return;
        }
        let (left, right) = {
            let node = &self.nodes[slot as usize];
            (node.left, node.right)
        };
        self.release_subtree(left);
        self.release_subtree(right);
        self.release(slot);
    }

    /// Descends to the leaf covering the point, growing every subtree size on
    /// the way and marking passed internal nodes stale. Never rebuilds; a
    /// bucket pushed past capacity is divided on the spot. `path` is left
    /// holding the internal slots the descent passed through, root first.
    pub(crate) fn insert<S: PointSource>(&mut self, source: &S, id: u32, path: &mut Vec<u32>) {
        path.clear();
        if self.root == NONE {
            self.root = self.alloc_leaf(vec![id]);
            return;
        }

        let mut slot = self.root;
        loop {
            let node = &mut self.nodes[slot as usize];
            node.size += 1;
            if node.left == NONE {
                node.bucket.push(id);
                break;
            }
            node.stale = true;
            path.push(slot);
            let axis = node.split_dim as usize;
            let next = if source.get(id as usize, axis) < node.split_val {
                node.left
            } else {
                node.right
            };
            slot = next;
        }

        if self.nodes[slot as usize].bucket.len() > self.leaf_capacity {
            self.split_leaf(source, slot);
        }
    }

    /// Turns an overfull leaf into an internal node with two leaf children,
    /// cutting at the median of the widest axis. Left keeps coordinates
    /// strictly below the cut. A bucket whose points coincide on every axis
    /// stays a leaf, whatever its size.
    fn split_leaf<S: PointSource>(&mut self, source: &S, slot: u32) {
        let mut ids = std::mem::take(&mut self.nodes[slot as usize].bucket);

        let (axis, axis_min, spread) = widest_axis(source, &ids);
        if spread <= 0.0 {
            self.nodes[slot as usize].bucket = ids;
            return;
        }

        let (cut, split_val) = split_ids(source, &mut ids, axis, axis_min);
        let hi = ids.split_off(cut);
        let left = self.alloc_leaf(ids);
        let right = self.alloc_leaf(hi);

        let node = &mut self.nodes[slot as usize];
        node.split_dim = axis as u32;
        node.split_val = split_val;
        node.left = left;
        node.right = right;
        node.stale = true;
    }

    /// Appends every point id stored under `slot`, left to right.
    pub(crate) fn collect_ids(&self, slot: u32, out: &mut Vec<u32>) {
        if slot == NONE {
            return;
        }
        let node = &self.nodes[slot as usize];
        if node.left == NONE {
            out.extend_from_slice(&node.bucket);
        } else {
            self.collect_ids(node.left, out);
            self.collect_ids(node.right, out);
        }
    }

    /// Replaces the subtree at `slot` with a freshly balanced one over the
    /// same points. The slot itself survives, so the parent link stays valid;
    /// its generation is bumped to retire queued references. Returns the
    /// number of points moved, which is the cost of the call.
    pub(crate) fn rebuild<S: PointSource>(&mut self, source: &S, slot: u32) -> usize {
        let mut ids = Vec::with_capacity(self.nodes[slot as usize].size as usize);
        self.collect_ids(slot, &mut ids);

        let (old_left, old_right) = {
            let node = &self.nodes[slot as usize];
            (node.left, node.right)
        };
        self.release_subtree(old_left);
        self.release_subtree(old_right);

        let cost = ids.len();
        let fresh = self.build_balanced(source, &mut ids);

        // Move the built root into the surviving slot and recycle its slot
        let fresh_generation = self.nodes[fresh as usize].generation;
        let shell = Node {
            split_dim: 0,
            split_val: 0.0,
            left: NONE,
            right: NONE,
            size: 0,
            ratio: 1.0,
            stale: false,
            queued: false,
            generation: fresh_generation,
            bucket: Vec::new(),
        };
        let built = std::mem::replace(&mut self.nodes[fresh as usize], shell);
        self.free.push(fresh);

        let generation = self.nodes[slot as usize].generation + 1;
        self.nodes[slot as usize] = Node { generation, ..built };
        cost
    }

    fn build_balanced<S: PointSource>(&mut self, source: &S, ids: &mut [u32]) -> u32 {
        if ids.len() <= self.leaf_capacity {
            return self.alloc_leaf(ids.to_vec());
        }

        let (axis, axis_min, spread) = widest_axis(source, ids);
        if spread <= 0.0 {
            // Coincident points are indivisible
            return self.alloc_leaf(ids.to_vec());
        }

        let (cut, split_val) = split_ids(source, ids, axis, axis_min);
        let size = ids.len() as u32;
        let (lo, hi) = ids.split_at_mut(cut);
        let left = self.build_balanced(source, lo);
        let right = self.build_balanced(source, hi);

        let ratio = subtree_ratio(
            self.nodes[left as usize].size,
            self.nodes[right as usize].size,
        );
        self.alloc(Node {
            split_dim: axis as u32,
            split_val,
            left,
            right,
            size,
            ratio,
            stale: false,
            queued: false,
            generation: 0,
            bucket: Vec::new(),
        })
    }

    /// Depth of the deepest leaf, the root sitting at depth zero.
    pub(crate) fn max_depth(&self) -> usize {
        if self.root == NONE {
            return 0;
        }
        self.depth_below(self.root)
    }

    fn depth_below(&self, slot: u32) -> usize {
        let node = &self.nodes[slot as usize];
        if node.left == NONE {
            return 0;
        }
        1 + self
            .depth_below(node.left)
            .max(self.depth_below(node.right))
    }

    /// Leaf depth -> number of points stored at that depth. Values sum to
    /// the number of points held.
    pub(crate) fn count_distribution(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        if self.root != NONE {
            self.count_below(self.root, 0, &mut counts);
        }
        counts
    }

    fn count_below(&self, slot: u32, depth: usize, counts: &mut BTreeMap<usize, usize>) {
        let node = &self.nodes[slot as usize];
        if node.left == NONE {
            *counts.entry(depth).or_insert(0) += node.bucket.len();
        } else {
            self.count_below(node.left, depth + 1, counts);
            self.count_below(node.right, depth + 1, counts);
        }
    }

    /// Branch-and-bound k-NN. Every node entered costs one check; the
    /// traversal stops once `budget` checks are spent, so a tight budget can
    /// hand back fewer than k neighbors. Returns the checks used.
    pub(crate) fn knn<S: PointSource, M: Metric>(
        &self,
        source: &S,
        metric: &M,
        query: &[f32],
        set: &mut ResultSet,
        budget: usize,
    ) -> usize {
        let mut checks = 0;
        if self.root != NONE {
            self.knn_below(self.root, source, metric, query, set, &mut checks, budget);
        }
        checks
    }

    fn knn_below<S: PointSource, M: Metric>(
        &self,
        slot: u32,
        source: &S,
        metric: &M,
        query: &[f32],
        set: &mut ResultSet,
        checks: &mut usize,
        budget: usize,
    ) {
        if *checks >= budget {
            return;
        }
        *checks += 1;

        let node = &self.nodes[slot as usize];
        if node.left == NONE {
            for &id in &node.bucket {
                let dist = metric.distance(query, source.point(id as usize));
                set.offer(id as usize, dist);
            }
            return;
        }

        // Visit the child holding the query first
        let axis = node.split_dim as usize;
        let (near, far) = if query[axis] < node.split_val {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.knn_below(near, source, metric, query, set, checks, budget);

        // The far side can only improve on the k-th hit if the splitting
        // plane is closer than that hit
        if !set.full() || metric.axis_distance(query[axis], node.split_val) < set.worst() {
            self.knn_below(far, source, metric, query, set, checks, budget);
        }
    }

    #[cfg(test)]
    pub(crate) fn free_slots(&self) -> usize {
        self.free.len()
    }
}

/// Axis with the largest coordinate spread over `ids`, with that axis's
/// minimum and spread. A spread of zero means the points coincide everywhere.
fn widest_axis<S: PointSource>(source: &S, ids: &[u32]) -> (usize, f32, f32) {
    let dim = source.dim();
    let mut min = vec![f32::INFINITY; dim];
    let mut max = vec![f32::NEG_INFINITY; dim];
    for &id in ids {
        for d in 0..dim {
            let v = source.get(id as usize, d);
            if v < min[d] {
                min[d] = v;
            }
            if v > max[d] {
                max[d] = v;
            }
        }
    }

    let mut axis = 0;
    let mut spread = 0.0;
    for d in 0..dim {
        let s = max[d] - min[d];
        if s > spread {
            spread = s;
            axis = d;
        }
    }
    (axis, min[axis], spread)
}

/// Reorders `ids` so coordinates strictly below the returned cut value come
/// first, and returns `(cut index, cut value)`. The cut value is the median
/// coordinate on `axis`; when everything below the median equals it, the cut
/// moves just above the axis minimum so neither side is empty. Callers must
/// ensure the spread on `axis` is positive.
fn split_ids<S: PointSource>(
    source: &S,
    ids: &mut [u32],
    axis: usize,
    axis_min: f32,
) -> (usize, f32) {
    let mid = ids.len() / 2;
    ids.select_nth_unstable_by(mid, |&a, &b| {
        let va = source.get(a as usize, axis);
        let vb = source.get(b as usize, axis);
        va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut split_val = source.get(ids[mid] as usize, axis);

    let mut cut = partition_below(source, ids, axis, split_val);
    if cut == 0 {
        let mut above = f32::INFINITY;
        for &id in ids.iter() {
            let v = source.get(id as usize, axis);
            if v > axis_min && v < above {
                above = v;
            }
        }
        split_val = above;
        cut = partition_below(source, ids, axis, split_val);
    }
    (cut, split_val)
}

fn partition_below<S: PointSource>(source: &S, ids: &mut [u32], axis: usize, split: f32) -> usize {
    let mut cut = 0;
    for i in 0..ids.len() {
        if source.get(ids[i] as usize, axis) < split {
            ids.swap(i, cut);
            cut += 1;
        }
    }
    cut
}
