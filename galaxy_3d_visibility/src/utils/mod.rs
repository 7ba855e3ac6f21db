//! Small utilities shared by the spatial trees.

mod slot_allocator;

pub use slot_allocator::SlotAllocator;
