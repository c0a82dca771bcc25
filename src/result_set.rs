//! Bounded collectors for `(distance, id)` candidates.
//!
//! Every search path feeds candidates into a [`ResultSet`] and asks it for the
//! worst distance it would still admit; that value is the pruning threshold
//! for all branch-and-bound tests.
//!
//! | Variant | Capacity | `worst_distance()` |
//! |---|---|---|
//! | [`KnnResultSet`] | k | `+inf` until full, then the k-th distance |
//! | [`KnnRadiusResultSet`] | k | the radius until full, then the k-th distance |
//! | [`RadiusResultSet`] | unbounded | the radius |
//! | [`CountRadiusResultSet`] | counts only | the radius |
//!
//! A candidate whose distance is `>=` the worst distance is never admitted, so
//! a full set is unaffected by such inserts. Ties are ordered by smaller id.
//! Every variant admits a given id at most once per query, so an index that
//! offers the same point twice (LSH tables overlap) reports it once.

use smallvec::SmallVec;

/// A scored candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

impl Neighbor {
    #[inline]
    fn precedes(&self, distance: f64, index: usize) -> bool {
        self.distance < distance || (self.distance == distance && self.index < index)
    }
}

/// Collector contract shared by all search paths.
pub trait ResultSet {
    /// Drop all collected candidates, restoring the initial bound.
    fn clear(&mut self);

    /// Number of admitted candidates.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the set has reached its capacity (radius sets are always full).
    fn is_full(&self) -> bool;

    /// Largest distance a new candidate must beat to be admitted.
    fn worst_distance(&self) -> f64;

    /// Offer a candidate.
    fn add_point(&mut self, distance: f64, index: usize);

    /// Copy up to `min(distances.len(), indices.len())` entries out; returns the count.
    ///
    /// Bounded sets are always sorted; the unbounded radius set sorts only if
    /// `sorted` is set.
    fn copy_into(&mut self, distances: &mut [f64], indices: &mut [usize], sorted: bool) -> usize;
}

/// Insertion-sorted buffer shared by the two k-bounded variants.
#[derive(Debug, Clone)]
struct SortedBuffer {
    entries: SmallVec<[Neighbor; 16]>,
    capacity: usize,
}

impl SortedBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            entries: SmallVec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Insert assuming the caller already checked the admission bound.
    fn insert(&mut self, distance: f64, index: usize) {
        if self.capacity == 0 {
            return;
        }
        let pos = self.entries.partition_point(|e| e.precedes(distance, index));
        // Same id at the same distance was already admitted (multi-table probes).
        if let Some(e) = self.entries.get(pos) {
            if e.index == index && e.distance == distance {
                return;
            }
        }
        if self.is_full() {
            self.entries.pop();
        }
        self.entries.insert(pos, Neighbor { index, distance });
    }

    fn last_distance(&self) -> f64 {
        self.entries.last().map_or(f64::INFINITY, |e| e.distance)
    }

    fn copy_into(&self, distances: &mut [f64], indices: &mut [usize]) -> usize {
        let n = self.entries.len().min(distances.len()).min(indices.len());
        for (i, e) in self.entries.iter().take(n).enumerate() {
            distances[i] = e.distance;
            indices[i] = e.index;
        }
        n
    }
}

/// k-nearest collector.
#[derive(Debug, Clone)]
pub struct KnnResultSet {
    buf: SortedBuffer,
}

impl KnnResultSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: SortedBuffer::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity
    }

    /// Admitted candidates, ascending by distance.
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.buf.entries
    }
}

impl ResultSet for KnnResultSet {
    fn clear(&mut self) {
        self.buf.entries.clear();
    }

    fn len(&self) -> usize {
        self.buf.entries.len()
    }

    fn is_full(&self) -> bool {
        self.buf.is_full()
    }

    fn worst_distance(&self) -> f64 {
        if self.buf.capacity == 0 {
            f64::NEG_INFINITY
        } else if self.buf.is_full() {
            self.buf.last_distance()
        } else {
            f64::INFINITY
        }
    }

    fn add_point(&mut self, distance: f64, index: usize) {
        if distance >= self.worst_distance() {
            return;
        }
        self.buf.insert(distance, index);
    }

    fn copy_into(&mut self, distances: &mut [f64], indices: &mut [usize], _sorted: bool) -> usize {
        self.buf.copy_into(distances, indices)
    }
}

/// k-nearest collector that also bounds admissions by a radius.
#[derive(Debug, Clone)]
pub struct KnnRadiusResultSet {
    buf: SortedBuffer,
    radius: f64,
}

impl KnnRadiusResultSet {
    pub fn new(capacity: usize, radius: f64) -> Self {
        Self {
            buf: SortedBuffer::new(capacity),
            radius,
        }
    }

    pub fn neighbors(&self) -> &[Neighbor] {
        &self.buf.entries
    }
}

impl ResultSet for KnnRadiusResultSet {
    fn clear(&mut self) {
        self.buf.entries.clear();
    }

    fn len(&self) -> usize {
        self.buf.entries.len()
    }

    fn is_full(&self) -> bool {
        self.buf.is_full()
    }

    fn worst_distance(&self) -> f64 {
        if self.buf.capacity == 0 {
            f64::NEG_INFINITY
        } else if self.buf.is_full() {
            self.buf.last_distance().min(self.radius)
        } else {
            self.radius
        }
    }

    fn add_point(&mut self, distance: f64, index: usize) {
        if distance >= self.worst_distance() {
            return;
        }
        self.buf.insert(distance, index);
    }

    fn copy_into(&mut self, distances: &mut [f64], indices: &mut [usize], _sorted: bool) -> usize {
        self.buf.copy_into(distances, indices)
    }
}

/// Growable bitset of ids already admitted by an unbounded set.
#[derive(Debug, Clone, Default)]
struct SeenIds {
    bits: Vec<u64>,
}

impl SeenIds {
    /// Mark `id`; returns `false` if it was already marked.
    #[inline]
    fn insert(&mut self, id: usize) -> bool {
        let (word, bit) = (id / 64, 1u64 << (id % 64));
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let fresh = self.bits[word] & bit == 0;
        self.bits[word] |= bit;
        fresh
    }

    fn clear(&mut self) {
        self.bits.fill(0);
    }
}

/// Unbounded collector of everything strictly inside a radius.
#[derive(Debug, Clone)]
pub struct RadiusResultSet {
    entries: Vec<Neighbor>,
    seen: SeenIds,
    radius: f64,
}

impl RadiusResultSet {
    pub fn new(radius: f64) -> Self {
        Self {
            entries: Vec::with_capacity(1024),
            seen: SeenIds::default(),
            radius,
        }
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.index.cmp(&b.index))
        });
    }
}

impl ResultSet for RadiusResultSet {
    fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_full(&self) -> bool {
        true
    }

    fn worst_distance(&self) -> f64 {
        self.radius
    }

    fn add_point(&mut self, distance: f64, index: usize) {
        if distance < self.radius && self.seen.insert(index) {
            self.entries.push(Neighbor { index, distance });
        }
    }

    fn copy_into(&mut self, distances: &mut [f64], indices: &mut [usize], sorted: bool) -> usize {
        if sorted {
            self.sort();
        }
        let n = self.entries.len().min(distances.len()).min(indices.len());
        for (i, e) in self.entries.iter().take(n).enumerate() {
            distances[i] = e.distance;
            indices[i] = e.index;
        }
        n
    }
}

/// Counts distinct ids under a radius without storing distances.
#[derive(Debug, Clone)]
pub struct CountRadiusResultSet {
    count: usize,
    seen: SeenIds,
    radius: f64,
}

impl CountRadiusResultSet {
    pub fn new(radius: f64) -> Self {
        Self {
            count: 0,
            seen: SeenIds::default(),
            radius,
        }
    }
}

impl ResultSet for CountRadiusResultSet {
    fn clear(&mut self) {
        self.count = 0;
        self.seen.clear();
    }

    fn len(&self) -> usize {
        self.count
    }

    fn is_full(&self) -> bool {
        true
    }

    fn worst_distance(&self) -> f64 {
        self.radius
    }

    fn add_point(&mut self, distance: f64, index: usize) {
        if distance < self.radius && self.seen.insert(index) {
            self.count += 1;
        }
    }

    fn copy_into(&mut self, _distances: &mut [f64], _indices: &mut [usize], _sorted: bool) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(set: &KnnResultSet) -> Vec<usize> {
        set.neighbors().iter().map(|n| n.index).collect()
    }

    #[test]
    fn knn_keeps_k_smallest_sorted() {
        let mut set = KnnResultSet::new(3);
        for (d, i) in [(5.0, 0), (1.0, 1), (4.0, 2), (2.0, 3), (3.0, 4)] {
            set.add_point(d, i);
        }
        assert_eq!(ids(&set), vec![1, 3, 4]);
        assert_eq!(set.worst_distance(), 3.0);
        assert!(set.is_full());
    }

    #[test]
    fn knn_worst_is_infinite_until_full() {
        let mut set = KnnResultSet::new(2);
        set.add_point(1.0, 0);
        assert_eq!(set.worst_distance(), f64::INFINITY);
        set.add_point(2.0, 1);
        assert_eq!(set.worst_distance(), 2.0);
    }

    #[test]
    fn ties_prefer_smaller_id() {
        let mut set = KnnResultSet::new(2);
        set.add_point(1.0, 12);
        set.add_point(1.0, 9);
        set.add_point(1.0, 3);
        assert_eq!(ids(&set), vec![3, 9]);
    }

    #[test]
    fn equal_to_worst_is_rejected() {
        let mut set = KnnResultSet::new(1);
        set.add_point(2.0, 5);
        set.add_point(2.0, 1);
        assert_eq!(ids(&set), vec![5]);
    }

    #[test]
    fn repeated_entry_is_admitted_once() {
        let mut set = KnnResultSet::new(3);
        set.add_point(1.0, 4);
        set.add_point(1.0, 4);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn zero_capacity_admits_nothing() {
        let mut set = KnnResultSet::new(0);
        set.add_point(0.0, 0);
        assert!(set.is_empty());
        assert!(set.is_full());
    }

    #[test]
    fn knn_radius_starts_at_radius_and_tightens() {
        let mut set = KnnRadiusResultSet::new(2, 10.0);
        assert_eq!(set.worst_distance(), 10.0);
        set.add_point(12.0, 0);
        assert!(set.is_empty());
        set.add_point(4.0, 1);
        set.add_point(6.0, 2);
        assert_eq!(set.worst_distance(), 6.0);
        set.add_point(5.0, 3);
        let got: Vec<usize> = set.neighbors().iter().map(|n| n.index).collect();
        assert_eq!(got, vec![1, 3]);
    }

    #[test]
    fn radius_set_sorts_on_copy() {
        let mut set = RadiusResultSet::new(5.0);
        for (d, i) in [(3.0, 0), (1.0, 1), (7.0, 2), (1.0, 0)] {
            set.add_point(d, i);
        }
        let mut dists = [0.0; 4];
        let mut idx = [0; 4];
        let n = set.copy_into(&mut dists, &mut idx, true);
        assert_eq!(n, 2);
        assert_eq!(&idx[..n], &[1, 0]);
        assert_eq!(&dists[..n], &[1.0, 3.0]);
    }

    #[test]
    fn count_radius_counts_admissions() {
        let mut set = CountRadiusResultSet::new(2.0);
        for (i, d) in [0.5, 1.9, 2.0, 3.0].into_iter().enumerate() {
            set.add_point(d, i);
        }
        assert_eq!(set.len(), 2);
        set.clear();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn unbounded_sets_admit_each_id_once() {
        let offers = [(1.0, 7), (2.0, 3), (1.0, 7), (2.0, 3), (0.5, 200)];

        let mut radius = RadiusResultSet::new(5.0);
        let mut count = CountRadiusResultSet::new(5.0);
        for (d, i) in offers {
            radius.add_point(d, i);
            count.add_point(d, i);
        }
        assert_eq!(radius.len(), 3);
        assert_eq!(count.len(), 3);

        let (mut dists, mut idx) = ([0.0; 5], [0; 5]);
        let n = radius.copy_into(&mut dists, &mut idx, false);
        assert_eq!(&idx[..n], &[7, 3, 200]);

        // Marks are per query.
        radius.clear();
        count.clear();
        radius.add_point(1.0, 7);
        count.add_point(1.0, 7);
        assert_eq!((radius.len(), count.len()), (1, 1));
    }
}
