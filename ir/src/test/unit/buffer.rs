use smallvec::smallvec;

use crate::buffer::{BufDim, RawBuffer};

fn buffer_1d(storage: &mut [i32], min: i64) -> RawBuffer {
    RawBuffer::new(
        storage.as_mut_ptr() as *mut u8,
        4,
        smallvec![BufDim::new(min, storage.len() as i64, 4)],
    )
}

#[test]
fn addressing_respects_min() {
    let mut storage = [0i32; 10];
    let buf = buffer_1d(&mut storage, 3);

    buf.set::<i32>(&[3], 7);
    buf.set::<i32>(&[12], 9);
    assert_eq!(storage[0], 7);
    assert_eq!(storage[9], 9);
}

#[test]
fn two_dimensional_strides() {
    let mut storage = vec![0i32; 12];
    let buf = RawBuffer::new(
        storage.as_mut_ptr() as *mut u8,
        4,
        smallvec![BufDim::new(0, 4, 4), BufDim::new(0, 3, 16)],
    );
    buf.set::<i32>(&[1, 2], 42);
    assert_eq!(storage[2 * 4 + 1], 42);
}

#[test]
fn crop_adjusts_base_for_unfolded_dims() {
    let mut storage = [0i32; 10];
    for (i, v) in storage.iter_mut().enumerate() {
        *v = i as i32;
    }
    let mut buf = buffer_1d(&mut storage, 0);
    buf.crop_dim(0, 4, 6);

    assert_eq!(buf.dims[0].min, 4);
    assert_eq!(buf.dims[0].extent, 3);
    assert_eq!(buf.get::<i32>(&[4]), 4);
    assert_eq!(buf.get::<i32>(&[6]), 6);
}

#[test]
fn crop_clamps_to_existing_bounds() {
    let mut storage = [0i32; 10];
    let mut buf = buffer_1d(&mut storage, 0);
    buf.crop_dim(0, -5, 100);
    assert_eq!(buf.dims[0].min, 0);
    assert_eq!(buf.dims[0].extent, 10);
}

#[test]
fn folded_dim_aliases_congruent_coordinates() {
    let mut storage = [0i32; 3];
    let mut buf = buffer_1d(&mut storage, 0);
    buf.dims[0].fold_factor = 3;
    buf.dims[0].extent = 100;

    buf.set::<i32>(&[1], 11);
    assert_eq!(buf.get::<i32>(&[4]), 11);
    assert_eq!(buf.get::<i32>(&[97]), 11);

    // Cropping a folded dim must not move the base.
    let base = buf.base;
    buf.crop_dim(0, 10, 12);
    assert_eq!(buf.base, base);
    assert_eq!(buf.get::<i32>(&[10]), 11);
}

#[test]
fn slice_fixes_a_coordinate() {
    let mut storage = vec![0i32; 12];
    let buf = RawBuffer::new(
        storage.as_mut_ptr() as *mut u8,
        4,
        smallvec![BufDim::new(0, 4, 4), BufDim::new(0, 3, 16)],
    );
    buf.set::<i32>(&[2, 1], 5);

    let mut row = buf.clone();
    row.slice_dim(1, 1);
    assert_eq!(row.rank(), 1);
    assert_eq!(row.get::<i32>(&[2]), 5);
}

#[test]
fn truncate_rank_drops_trailing_dims() {
    let mut storage = vec![0i32; 12];
    let mut buf = RawBuffer::new(
        storage.as_mut_ptr() as *mut u8,
        4,
        smallvec![BufDim::new(0, 4, 4), BufDim::new(0, 3, 16)],
    );
    buf.truncate_rank(1);
    assert_eq!(buf.rank(), 1);
}

#[test]
fn size_bytes_caps_folded_extents() {
    let mut storage = [0u8; 1];
    let mut dim = BufDim::new(0, 100, 4);
    dim.fold_factor = 3;
    let buf = RawBuffer::new(storage.as_mut_ptr(), 4, smallvec![dim]);
    assert_eq!(buf.size_bytes(), 12);
}

#[test]
fn for_each_index_visits_in_order() {
    let mut storage = vec![0i32; 6];
    let buf = RawBuffer::new(
        storage.as_mut_ptr() as *mut u8,
        4,
        smallvec![BufDim::new(1, 2, 4), BufDim::new(0, 3, 8)],
    );
    let mut seen = Vec::new();
    buf.for_each_index(|c| seen.push((c[0], c[1])));
    assert_eq!(seen, vec![(1, 0), (2, 0), (1, 1), (2, 1), (1, 2), (2, 2)]);
}

#[test]
fn empty_extent_visits_nothing() {
    let mut storage = [0i32; 1];
    let mut buf = buffer_1d(&mut storage, 0);
    buf.dims[0].extent = 0;
    let mut count = 0;
    buf.for_each_index(|_| count += 1);
    assert_eq!(count, 0);
    assert_eq!(buf.size_bytes(), 0);
}
