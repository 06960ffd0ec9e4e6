use std::slice::{ChunksExact, ChunksExactMut};

/// Where each per-feature statistic lives inside a weight group.
///
/// Slot `0` always holds the weight. A slot offset of `0` for any other statistic
/// means the statistic is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub adaptive: usize,
    pub normalized: usize,
    pub feature_mask: usize,
    stride_shift: u32,
}

impl SlotLayout {
    /// Creates a new `SlotLayout`.
    ///
    /// # Arguments
    /// * `adaptive` - Whether to keep the sum of squared gradients.
    /// * `normalized` - Whether to keep the largest absolute feature value.
    /// * `feature_mask` - Whether to keep a per-feature trainability mask.
    pub fn new(adaptive: bool, normalized: bool, feature_mask: bool) -> Self {
        let adaptive = adaptive as usize;
        let normalized = if normalized { adaptive + 1 } else { 0 };
        let next = 1 + adaptive + (normalized != 0) as usize;
        let (feature_mask, used) = if feature_mask {
            (next, next + 1)
        } else {
            (0, next)
        };

        Self {
            adaptive,
            normalized,
            feature_mask,
            stride_shift: ceil_log_2(used - 1),
        }
    }

    /// The distance between two consecutive weight groups.
    pub fn stride(&self) -> usize {
        1 << self.stride_shift
    }

    /// The number of leading slots that hold learned state and are persisted in
    /// resumable checkpoints.
    pub fn stats(&self) -> usize {
        1 + (self.adaptive != 0) as usize + (self.normalized != 0) as usize
    }
}

fn ceil_log_2(v: usize) -> u32 {
    usize::BITS - v.leading_zeros()
}

/// A flat table of `2^num_bits` weight groups, each `stride` floats wide.
///
/// Feature indices are hashed into the table by masking them to `num_bits` bits,
/// so every index maps to a valid group.
#[derive(Debug, Clone)]
pub struct WeightStore {
    weights: Box<[f32]>,
    layout: SlotLayout,
    index_mask: u32,
}

impl WeightStore {
    /// Creates a new zeroed `WeightStore`.
    ///
    /// # Arguments
    /// * `num_bits` - The log2 of the amount of weight groups.
    /// * `layout` - The slot layout of every group.
    pub fn new(num_bits: u32, layout: SlotLayout) -> Self {
        let length = 1usize << num_bits;

        Self {
            weights: vec![0.; length << layout.stride_shift].into_boxed_slice(),
            layout,
            index_mask: (length - 1) as u32,
        }
    }

    /// Returns the amount of weight groups in the table.
    pub fn len(&self) -> usize {
        self.index_mask as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// Maps a raw feature index to the position of its weight group.
    pub fn logical(&self, index: u32) -> u32 {
        index & self.index_mask
    }

    fn base(&self, index: u32) -> usize {
        (self.logical(index) as usize) << self.layout.stride_shift
    }

    /// Returns the slots of the group `index` hashes to.
    pub fn group(&self, index: u32) -> &[f32] {
        let base = self.base(index);
        &self.weights[base..base + self.stride()]
    }

    /// Returns the mutable slots of the group `index` hashes to.
    pub fn group_mut(&mut self, index: u32) -> &mut [f32] {
        let base = self.base(index);
        let stride = self.stride();
        &mut self.weights[base..base + stride]
    }

    /// Returns the weight of the group `index` hashes to.
    pub fn weight(&self, index: u32) -> f32 {
        self.weights[self.base(index)]
    }

    pub fn groups(&self) -> ChunksExact<'_, f32> {
        self.weights.chunks_exact(self.stride())
    }

    pub fn groups_mut(&mut self) -> ChunksExactMut<'_, f32> {
        let stride = self.stride();
        self.weights.chunks_exact_mut(stride)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_power_of_two_covering_used_slots() {
        let cases = [
            ((false, false, false), 1, (0, 0, 0)),
            ((true, false, false), 2, (1, 0, 0)),
            ((false, true, false), 2, (0, 1, 0)),
            ((true, true, false), 4, (1, 2, 0)),
            ((false, false, true), 2, (0, 0, 1)),
            ((true, false, true), 4, (1, 0, 2)),
            ((false, true, true), 4, (0, 1, 2)),
            ((true, true, true), 4, (1, 2, 3)),
        ];

        for ((a, n, m), stride, slots) in cases {
            let layout = SlotLayout::new(a, n, m);
            assert_eq!(layout.stride(), stride, "{a} {n} {m}");
            assert_eq!((layout.adaptive, layout.normalized, layout.feature_mask), slots);
        }
    }

    #[test]
    fn stats_count_learned_slots() {
        assert_eq!(SlotLayout::new(false, false, true).stats(), 1);
        assert_eq!(SlotLayout::new(true, true, true).stats(), 3);
    }

    #[test]
    fn indices_wrap_into_the_table() {
        const NUM_BITS: u32 = 4;

        let mut store = WeightStore::new(NUM_BITS, SlotLayout::new(true, true, false));
        store.group_mut(3)[0] = 1.5;

        assert_eq!(store.len(), 16);
        assert_eq!(store.as_slice().len(), 64);
        assert_eq!(store.weight(3 + 16), 1.5);
        assert_eq!(store.logical(u32::MAX), 15);
        assert_eq!(store.groups().nth(3).unwrap()[0], 1.5);
    }
}
