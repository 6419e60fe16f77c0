use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::tree::{subtree_ratio, Tree, NONE};

/// Recomputes the cached ratio of every stale node. Insertion staleness runs
/// root-to-leaf along the descent path, so a fresh node never hides a stale
/// one below it and the sweep can stop at the first fresh subtree.
pub(crate) fn refresh(tree: &mut Tree) {
    if tree.root != NONE {
        refresh_below(tree, tree.root);
    }
}

fn refresh_below(tree: &mut Tree, slot: u32) {
    let (stale, left, right) = {
        let node = &tree.nodes[slot as usize];
        (node.stale, node.left, node.right)
    };
    if !stale || left == NONE {
        return;
    }
    refresh_below(tree, left);
    refresh_below(tree, right);

    let ratio = subtree_ratio(
        tree.nodes[left as usize].size,
        tree.nodes[right as usize].size,
    );
    let node = &mut tree.nodes[slot as usize];
    node.ratio = ratio;
    node.stale = false;
}

/// Worst cached ratio per tree level, root first. Leaves carry no ratio, so
/// a tree whose root is still a leaf (or an empty tree) yields nothing.
pub(crate) fn level_ratios(tree: &Tree) -> Vec<f32> {
    let mut levels = Vec::new();
    if tree.root != NONE {
        levels_below(tree, tree.root, 0, &mut levels);
    }
    levels
}

fn levels_below(tree: &Tree, slot: u32, depth: usize, levels: &mut Vec<f32>) {
    let node = &tree.nodes[slot as usize];
    if node.left == NONE {
        return;
    }
    if levels.len() <= depth {
        levels.resize(depth + 1, 0.0);
    }
    if node.ratio > levels[depth] {
        levels[depth] = node.ratio;
    }
    levels_below(tree, node.left, depth + 1, levels);
    levels_below(tree, node.right, depth + 1, levels);
}

/// A subtree queued for rebuilding. `generation` pins the node identity at
/// discovery time; a rebuild passing through the slot retires the entry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
    pub(crate) ratio: f32,
    pub(crate) size: u32,
    pub(crate) depth: usize,
}

impl Ord for Candidate {
    // Worst ratio first; among equals the larger, then shallower, subtree
    fn cmp(&self, other: &Self) -> Ordering {
        self.ratio
            .total_cmp(&other.ratio)
            .then(self.size.cmp(&other.size))
            .then(other.depth.cmp(&self.depth))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Whether a subtree is worth queueing: over the threshold, and over the
/// best ratio any split of `size` points can reach at all, so a subtree
/// already as even as its point count allows never queues.
pub(crate) fn qualifies(ratio: f32, size: u32, threshold: f32) -> bool {
    let ceil_half = size.div_ceil(2);
    let floor = subtree_ratio(ceil_half, size - ceil_half);
    ratio > threshold && ratio > floor
}

/// The maintenance queue: a max-heap of rebuild candidates, fed from the
/// insertion path and drained by `update`. Entries retire lazily; a rebuild
/// bumps the generation of every slot it touches, orphaning whatever was
/// queued under it, so a subtree rebuilt into the only shape its points
/// allow stays out of the queue until another insertion lands below it.
pub(crate) struct CandidateQueue {
    heap: BinaryHeap<Candidate>,
}

impl CandidateQueue {
    pub(crate) fn new() -> CandidateQueue {
        CandidateQueue {
            heap: BinaryHeap::new(),
        }
    }

    /// Offers every internal node one insertion descended through, root
    /// first. A node holds at most one live entry; it can queue again only
    /// after that entry is popped or retired.
    pub(crate) fn offer_path(&mut self, tree: &mut Tree, path: &[u32], threshold: f32) {
        for (depth, &slot) in path.iter().enumerate() {
            let node = &tree.nodes[slot as usize];
            if node.queued {
                continue;
            }
            let ratio = subtree_ratio(
                tree.nodes[node.left as usize].size,
                tree.nodes[node.right as usize].size,
            );
            if qualifies(ratio, node.size, threshold) {
                self.heap.push(Candidate {
                    slot,
                    generation: node.generation,
                    ratio,
                    size: node.size,
                    depth,
                });
                tree.nodes[slot as usize].queued = true;
            }
        }
    }

    /// Pops entries until one still names a live, still-qualifying subtree
    /// and returns it refreshed to that subtree's present ratio and size.
    /// Entries whose subtree was rebuilt away, or whose ratio no longer
    /// clears the bar, fall out here.
    pub(crate) fn pop_current(&mut self, tree: &mut Tree, threshold: f32) -> Option<Candidate> {
        while let Some(entry) = self.heap.pop() {
            if !is_current(tree, &entry) {
                continue;
            }
            let node = &mut tree.nodes[entry.slot as usize];
            node.queued = false;
            let (left, right, size) = (node.left, node.right, node.size);
            let ratio = subtree_ratio(
                tree.nodes[left as usize].size,
                tree.nodes[right as usize].size,
            );
            if !qualifies(ratio, size, threshold) {
                continue;
            }
            return Some(Candidate { ratio, size, ..entry });
        }
        None
    }

    /// Puts back an entry the caller popped but could not afford, so it
    /// keeps its place for a richer call.
    pub(crate) fn requeue(&mut self, tree: &mut Tree, entry: Candidate) {
        tree.nodes[entry.slot as usize].queued = true;
        self.heap.push(entry);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Whether a queued candidate still points at the node it was made from.
pub(crate) fn is_current(tree: &Tree, candidate: &Candidate) -> bool {
    let node = &tree.nodes[candidate.slot as usize];
    node.generation == candidate.generation && node.left != NONE
}
