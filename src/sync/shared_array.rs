//! A bounded, dense array of 64-bit slots inside a shared region.
//!
//! Backs the condition-variable waiter table. The layout is a small header
//! (capacity, element size, length) followed by the slots. Every access
//! must happen under the owning primitive's internal mutex; nothing here is
//! atomic.

#![allow(unsafe_code)]

use crate::region::MemoryRegion;

const HEADER_CELLS: usize = 4;
const HEADER_SIZE: usize = HEADER_CELLS * 4;
const ELEM_SIZE: usize = 8;

/// A view over a shared waiter table.
///
/// Removal swaps the last slot into the hole, keeping the occupied prefix
/// dense so signallers can walk `0..len` without tombstones.
#[derive(Debug)]
pub(crate) struct SharedArray {
    base: *mut u8,
    capacity: usize,
}

// SAFETY: all access is serialized by the owning primitive's internal
// mutex, per this module's contract.
unsafe impl Send for SharedArray {}
unsafe impl Sync for SharedArray {}

impl SharedArray {
    /// Bytes a table with `capacity` slots occupies inside a region.
    pub(crate) const fn size_for(capacity: usize) -> usize {
        HEADER_SIZE + capacity * ELEM_SIZE
    }

    /// Initializes a fresh table in `region` and returns a view of it.
    /// Only the creator of the region calls this.
    pub(crate) fn new(region: &MemoryRegion, capacity: usize) -> Self {
        assert!(
            Self::size_for(capacity) <= region.size(),
            "region too small for a {capacity}-slot table"
        );
        let arr = Self {
            base: region.as_ptr(),
            capacity,
        };
        arr.write_header(0, capacity as i32);
        arr.write_header(1, ELEM_SIZE as i32);
        arr.write_header(2, 0);
        arr.write_header(3, 0);
        arr
    }

    /// A view of a table some other process already initialized.
    pub(crate) fn open(region: &MemoryRegion) -> Self {
        let mut arr = Self {
            base: region.as_ptr(),
            capacity: 0,
        };
        arr.capacity = arr.read_header(0) as usize;
        assert!(
            Self::size_for(arr.capacity) <= region.size(),
            "table header does not fit its region"
        );
        assert_eq!(arr.read_header(1) as usize, ELEM_SIZE, "element size mismatch");
        arr
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.read_header(2) as usize
    }

    /// Appends `id`. Returns false when the table is full.
    pub(crate) fn push(&self, id: u64) -> bool {
        let len = self.len();
        if len >= self.capacity {
            return false;
        }
        // SAFETY: len < capacity, so the slot is inside the region.
        unsafe { self.slot(len).write_unaligned(id) };
        self.write_header(2, (len + 1) as i32);
        true
    }

    /// Reads the `index`-th slot.
    pub(crate) fn at(&self, index: usize) -> u64 {
        assert!(index < self.len(), "slot {index} out of bounds");
        // SAFETY: bounds checked above.
        unsafe { self.slot(index).read_unaligned() }
    }

    /// Removes the `index`-th slot, swapping the last slot into the hole.
    pub(crate) fn remove_at(&self, index: usize) {
        let len = self.len();
        assert!(index < len, "slot {index} out of bounds");
        if index + 1 < len {
            // SAFETY: both slots are in bounds.
            unsafe {
                let last = self.slot(len - 1).read_unaligned();
                self.slot(index).write_unaligned(last);
            }
        }
        self.write_header(2, (len - 1) as i32);
    }

    fn slot(&self, index: usize) -> *mut u64 {
        // SAFETY wrapper: callers bound `index` by capacity.
        self.base
            .wrapping_add(HEADER_SIZE + index * ELEM_SIZE)
            .cast::<u64>()
    }

    fn read_header(&self, cell: usize) -> i32 {
        debug_assert!(cell < HEADER_CELLS);
        // SAFETY: header cells are inside the region by `size_for`.
        unsafe { self.base.wrapping_add(cell * 4).cast::<i32>().read_unaligned() }
    }

    fn write_header(&self, cell: usize, value: i32) {
        debug_assert!(cell < HEADER_CELLS);
        // SAFETY: as for `read_header`.
        unsafe {
            self.base
                .wrapping_add(cell * 4)
                .cast::<i32>()
                .write_unaligned(value);
        }
    }
}
