use std::ops::Index;

/// One search hit: a point id and its distance to the query.
///
/// Equality is defined by id alone, so hits can be compared against ground
/// truth regardless of how the distance was computed or rounded.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor {
    pub id: usize,
    pub dist: f32,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Neighbor {}

/// A fixed-capacity collector for the k best candidates of one query.
///
/// Entries are kept in ascending distance order. Once full, a candidate only
/// displaces the current worst entry if its distance is strictly smaller, so
/// repeated runs over the same data produce identical contents.
#[derive(Clone, Debug)]
pub struct ResultSet {
    capacity: usize,
    items: Vec<Neighbor>,
}

impl ResultSet {
    /// Creates an empty set that will hold at most `k` neighbors.
    pub fn new(k: usize) -> ResultSet {
        ResultSet {
            capacity: k,
            items: Vec::with_capacity(k),
        }
    }

    /// Maximum number of neighbors the set will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of neighbors currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the set holds its full k neighbors.
    pub fn full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// The k-th (largest) distance, or infinity while the set is not full.
    /// A zero-capacity set reports infinity forever.
    ///
    /// This is the pruning bound: a subtree whose minimum possible distance
    /// is not below this value cannot improve the result.
    pub fn worst(&self) -> f32 {
        match self.items.last() {
            Some(last) if self.full() => last.dist,
            _ => f32::INFINITY,
        }
    }

    /// Offers a candidate. Returns whether the set changed.
    ///
    /// A candidate whose id is already held never adds a second entry: it
    /// updates the held distance if the new one is smaller and is ignored
    /// otherwise.
    pub fn offer(&mut self, id: usize, dist: f32) -> bool {
        if let Some(pos) = self.items.iter().position(|n| n.id == id) {
            if dist < self.items[pos].dist {
                self.items.remove(pos);
                let at = self.items.partition_point(|n| n.dist <= dist);
                self.items.insert(at, Neighbor { id, dist });
                return true;
            }
            return false;
        }

        if self.items.len() < self.capacity {
            let at = self.items.partition_point(|n| n.dist <= dist);
            self.items.insert(at, Neighbor { id, dist });
            return true;
        }

        if self.capacity > 0 && dist < self.items[self.capacity - 1].dist {
            self.items.pop();
            let at = self.items.partition_point(|n| n.dist <= dist);
            self.items.insert(at, Neighbor { id, dist });
            return true;
        }

        false
    }

    /// Removes all neighbors, keeping the capacity.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Neighbors in ascending distance order.
    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.items.iter()
    }
}

impl Index<usize> for ResultSet {
    type Output = Neighbor;

    /// The j-th ranked neighbor, 0 being the nearest.
    fn index(&self, rank: usize) -> &Neighbor {
        &self.items[rank]
    }
}
