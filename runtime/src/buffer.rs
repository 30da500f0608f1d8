//! Dense, owning buffers for pipeline endpoints.

use smallvec::SmallVec;

use slinky_ir::{BufDim, Index, RawBuffer};

/// A heap-backed buffer with dense strides, used to hold pipeline inputs and
/// outputs. The [`RawBuffer`] header it exposes stays valid for as long as
/// the `OwnedBuffer` is alive.
#[derive(Debug)]
pub struct OwnedBuffer {
    raw: RawBuffer,
    #[allow(dead_code)]
    storage: Vec<u8>,
}

impl OwnedBuffer {
    /// Allocate a zero-initialized buffer with the given `(min, extent)` per
    /// dimension and dense strides (innermost dimension first).
    pub fn new(elem_size: Index, dims: &[(Index, Index)]) -> Self {
        let mut stride = elem_size;
        let mut buf_dims: SmallVec<[BufDim; 4]> = SmallVec::new();
        for &(min, extent) in dims {
            buf_dims.push(BufDim::new(min, extent, stride));
            stride *= extent.max(0);
        }
        let mut storage = vec![0u8; stride.max(elem_size) as usize];
        let raw = RawBuffer::new(storage.as_mut_ptr(), elem_size, buf_dims);
        Self { raw, storage }
    }

    /// Allocate for element type `T`.
    pub fn for_type<T>(dims: &[(Index, Index)]) -> Self {
        Self::new(std::mem::size_of::<T>() as Index, dims)
    }

    /// A header describing this buffer. Clones of the header alias the same
    /// storage.
    pub fn raw(&self) -> &RawBuffer {
        &self.raw
    }

    pub fn get<T: Copy>(&self, coords: &[Index]) -> T {
        self.raw.get(coords)
    }

    pub fn set<T: Copy>(&self, coords: &[Index], value: T) {
        self.raw.set(coords, value)
    }

    /// Fill every cell from a coordinate function.
    pub fn fill_with<T: Copy>(&self, mut f: impl FnMut(&[Index]) -> T) {
        self.raw.for_each_index(|coords| {
            self.raw.set(coords, f(coords));
        });
    }
}
