//! The runtime buffer layout.
//!
//! This layout is stable: every buffer crossing the callback boundary is a
//! [`RawBuffer`] header over externally-owned storage. Headers are cheap to
//! clone; crops and slices produce adjusted copies without touching the
//! underlying memory.

use smallvec::SmallVec;

use crate::symbol::Index;

/// One dimension of a runtime buffer. `fold_factor == 0` means unfolded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufDim {
    pub min: Index,
    pub extent: Index,
    /// Stride in bytes between consecutive coordinates.
    pub stride: Index,
    pub fold_factor: Index,
}

impl BufDim {
    pub fn new(min: Index, extent: Index, stride: Index) -> Self {
        Self { min, extent, stride, fold_factor: 0 }
    }

    pub fn max(&self) -> Index {
        self.min + self.extent - 1
    }

    /// First coordinate, for `begin()..end()` iteration in callbacks.
    pub fn begin(&self) -> Index {
        self.min
    }

    /// One past the last coordinate. May equal `begin()` for empty crops.
    pub fn end(&self) -> Index {
        self.min + self.extent.max(0)
    }

    pub fn contains(&self, i: Index) -> bool {
        i >= self.min && i <= self.max()
    }

    /// Byte offset of coordinate `i` within this dimension.
    ///
    /// Folded dimensions address storage by `i mod fold_factor` absolutely,
    /// so coordinates congruent modulo the fold factor share a cell no matter
    /// how the buffer has been cropped. Unfolded dimensions are relative to
    /// `min`, and cropping adjusts the base pointer instead.
    pub fn flat_offset_bytes(&self, i: Index) -> Index {
        if self.fold_factor > 0 {
            crate::eval::floor_mod(i, self.fold_factor) * self.stride
        } else {
            (i - self.min) * self.stride
        }
    }

    fn capped_extent(&self) -> Index {
        if self.fold_factor > 0 { self.extent.min(self.fold_factor) } else { self.extent }
    }
}

/// A buffer header: base pointer, element size, and per-dimension layout.
///
/// The header itself carries no ownership; whoever constructs one is
/// responsible for keeping the storage alive while the header is in use. The
/// evaluator guarantees this for headers it hands to callbacks.
#[derive(Debug, Clone)]
pub struct RawBuffer {
    pub base: *mut u8,
    pub elem_size: Index,
    pub dims: SmallVec<[BufDim; 4]>,
}

// Parallel loop iterations receive cloned headers over disjoint crops of the
// same allocation. The builder never folds or slides storage under a parallel
// loop, so concurrent accesses through these pointers do not alias writes.
unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    pub fn new(base: *mut u8, elem_size: Index, dims: SmallVec<[BufDim; 4]>) -> Self {
        Self { base, elem_size, dims }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total dense storage required for the (fold-capped) extents.
    pub fn size_bytes(&self) -> Index {
        let mut size = self.elem_size;
        for dim in &self.dims {
            let extent = dim.capped_extent().max(0);
            size = size.max(extent * dim.stride.abs());
            if extent == 0 {
                return 0;
            }
        }
        size
    }

    pub fn contains(&self, coords: &[Index]) -> bool {
        coords.len() == self.rank() && coords.iter().zip(&self.dims).all(|(&c, d)| d.contains(c))
    }

    /// Address of a coordinate. The coordinate need not be in bounds; callers
    /// that dereference must check [`RawBuffer::contains`] first.
    pub fn address_of(&self, coords: &[Index]) -> *mut u8 {
        debug_assert_eq!(coords.len(), self.rank());
        let mut offset = 0;
        for (&c, dim) in coords.iter().zip(&self.dims) {
            offset += dim.flat_offset_bytes(c);
        }
        self.base.wrapping_offset(offset as isize)
    }

    /// Read the element at `coords`.
    ///
    /// Panics when the coordinate is out of bounds or `T` does not match the
    /// element size. The header must describe live storage.
    pub fn get<T: Copy>(&self, coords: &[Index]) -> T {
        assert_eq!(std::mem::size_of::<T>() as Index, self.elem_size, "element type size mismatch");
        assert!(self.contains(coords), "coordinate {coords:?} out of bounds");
        unsafe { std::ptr::read_unaligned(self.address_of(coords) as *const T) }
    }

    /// Write the element at `coords`. Same preconditions as [`RawBuffer::get`].
    pub fn set<T: Copy>(&self, coords: &[Index], value: T) {
        assert_eq!(std::mem::size_of::<T>() as Index, self.elem_size, "element type size mismatch");
        assert!(self.contains(coords), "coordinate {coords:?} out of bounds");
        unsafe { std::ptr::write_unaligned(self.address_of(coords) as *mut T, value) }
    }

    /// Restrict dimension `d` to `[new_min, new_max]`, clamped to the current
    /// bounds. Unfolded dimensions advance the base pointer so addressing
    /// stays consistent with the new `min`.
    pub fn crop_dim(&mut self, d: usize, new_min: Index, new_max: Index) {
        let dim = &mut self.dims[d];
        let min = new_min.max(dim.min);
        let max = new_max.min(dim.max());
        if dim.fold_factor == 0 && min > dim.min {
            self.base = self.base.wrapping_offset(((min - dim.min) * dim.stride) as isize);
        }
        dim.min = min;
        dim.extent = max - min + 1;
    }

    /// Fix dimension `d` at coordinate `at` and remove it from the rank.
    pub fn slice_dim(&mut self, d: usize, at: Index) {
        let offset = self.dims[d].flat_offset_bytes(at);
        self.base = self.base.wrapping_offset(offset as isize);
        self.dims.remove(d);
    }

    /// Drop trailing dimensions beyond `rank`.
    pub fn truncate_rank(&mut self, rank: usize) {
        self.dims.truncate(rank);
    }

    /// Visit every coordinate in the buffer's bounds, outermost dimension
    /// varying slowest. Rank-0 buffers get a single empty-coordinate visit.
    pub fn for_each_index(&self, mut f: impl FnMut(&[Index])) {
        let rank = self.rank();
        let mut coords: SmallVec<[Index; 4]> = self.dims.iter().map(|d| d.min).collect();
        if self.dims.iter().any(|d| d.extent <= 0) {
            return;
        }
        loop {
            f(&coords);
            let mut d = 0;
            loop {
                if d == rank {
                    return;
                }
                coords[d] += 1;
                if coords[d] <= self.dims[d].max() {
                    break;
                }
                coords[d] = self.dims[d].min;
                d += 1;
            }
        }
    }
}
