//! Virtual window: which slice of a long collection must be rendered.
//!
//! Item positions are kept in a cumulative offset table (`offsets[i]` is the
//! start of item `i`, `offsets[len]` the total extent). New items are appended
//! with their estimated size; measuring an item shifts only the offsets after
//! it.

/// Estimated extent of the item at an index, used until it is measured.
pub type SizeEstimator = Box<dyn Fn(usize) -> u32 + Send + Sync>;

/// Index range to render, with its pixel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VirtualRange {
    /// First index to render.
    pub start: usize,
    /// One past the last index to render.
    pub end: usize,
    /// Offset of `start`.
    pub start_offset: u64,
    /// Offset one past the last rendered item.
    pub end_offset: u64,
}

impl VirtualRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    /// Whether the range reaches the end of a list of `len` items.
    pub fn reaches_end(&self, len: usize) -> bool {
        self.end >= len
    }
}

pub struct VirtualWindow {
    estimator: SizeEstimator,
    overscan: usize,
    sizes: Vec<u32>,
    offsets: Vec<u64>,
}

impl VirtualWindow {
    /// A window rendering `overscan` extra items beyond the viewport on each side.
    pub fn new(estimator: SizeEstimator, overscan: usize) -> Self {
        Self { estimator, overscan, sizes: Vec::new(), offsets: vec![0] }
    }

    /// A window that renders every item, for lists short enough not to need windowing.
    pub fn unbounded(estimator: SizeEstimator) -> Self {
        Self::new(estimator, usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    pub fn total_size(&self) -> u64 {
        self.offsets[self.sizes.len()]
    }

    /// Start offset of the item at `index`; `index == len` gives the total extent.
    pub fn offset_of(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    pub fn size_of(&self, index: usize) -> Option<u32> {
        self.sizes.get(index).copied()
    }

    /// Track a collection of `len` items.
    ///
    /// Growth appends estimated entries; shrinking truncates. Existing
    /// measurements are kept.
    pub fn set_len(&mut self, len: usize) {
        let current = self.sizes.len();
        if len <= current {
            self.sizes.truncate(len);
            self.offsets.truncate(len + 1);
            return;
        }

        self.sizes.reserve(len - current);
        self.offsets.reserve(len - current);
        let mut offset = self.offsets[current];
        for index in current..len {
            let size = (self.estimator)(index);
            offset += u64::from(size);
            self.sizes.push(size);
            self.offsets.push(offset);
        }
    }

    /// Record the rendered size of the item at `index`.
    ///
    /// Returns `false` for an out-of-range index.
    pub fn measure(&mut self, index: usize, size: u32) -> bool {
        let Some(previous) = self.sizes.get(index).copied() else {
            return false;
        };
        if previous == size {
            return true;
        }

        self.sizes[index] = size;
        if size > previous {
            let delta = u64::from(size - previous);
            for offset in &mut self.offsets[index + 1..] {
                *offset += delta;
            }
        } else {
            let delta = u64::from(previous - size);
            for offset in &mut self.offsets[index + 1..] {
                *offset -= delta;
            }
        }
        true
    }

    /// Range to render for a viewport of `extent` starting at `scroll`.
    ///
    /// The visible items are expanded by the overscan on both sides and
    /// clamped to `[0, len]`. Always satisfies `start <= end <= len`.
    pub fn range(&self, scroll: u64, extent: u64) -> VirtualRange {
        let len = self.sizes.len();
        if len == 0 {
            return VirtualRange::default();
        }

        let bottom = scroll.saturating_add(extent);
        // last item starting at or before the scroll position
        let first_visible = self.offsets[..len].partition_point(|&o| o <= scroll).saturating_sub(1);
        // items starting before the bottom edge are (at least partially) visible
        let visible_end = self.offsets[..len].partition_point(|&o| o < bottom).max(first_visible + 1);

        let start = first_visible.saturating_sub(self.overscan);
        let end = visible_end.saturating_add(self.overscan).min(len);

        VirtualRange { start, end, start_offset: self.offsets[start], end_offset: self.offsets[end] }
    }

    /// Whether rendering `range` should pull in the next page.
    ///
    /// This is the only prefetch signal: more data exists and the range
    /// already reaches the last loaded item.
    pub fn should_fetch_next(&self, range: &VirtualRange, has_next: bool) -> bool {
        has_next && range.reaches_end(self.sizes.len())
    }
}

impl std::fmt::Debug for VirtualWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualWindow")
            .field("len", &self.sizes.len())
            .field("overscan", &self.overscan)
            .field("total_size", &self.total_size())
            .finish()
    }
}
