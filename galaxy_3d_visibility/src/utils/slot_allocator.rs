/// Allocates and recycles `u32` node ids for arena-backed trees.
///
/// Both trees keep their nodes in a dense `Vec` indexed by id. Destroying a
/// node returns its id here so the next allocation reuses the slot instead of
/// growing the arena. Ids are plain indices: holders of a freed id must drop
/// it (the occlusion controller does so through `take_released_nodes`).
///
/// ```ignore
/// let mut ids = SlotAllocator::new();
/// let a = ids.alloc();  // 0
/// let b = ids.alloc();  // 1
/// ids.free(a);          // 0 is now available
/// let c = ids.alloc();  // 0 (recycled)
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    free_list: Vec<u32>,
    next_id: u32,
    len: u32,
}

impl SlotAllocator {
    /// Create a new empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next available id (most recently freed first)
    pub fn alloc(&mut self) -> u32 {
        self.len += 1;
        self.free_list.pop().unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        })
    }

    /// Return an id to the pool for reuse
    pub fn free(&mut self, id: u32) {
        debug_assert!(id < self.next_id, "freeing an unallocated slot: {}", id);
        debug_assert!(!self.free_list.contains(&id), "double free of slot {}", id);
        self.len -= 1;
        self.free_list.push(id);
    }

    /// Highest id ever allocated + 1 (minimum arena length)
    pub fn high_water_mark(&self) -> u32 {
        self.next_id
    }

    /// Number of live ids
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether no ids are live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget every id, including the high water mark
    pub fn clear(&mut self) {
        self.free_list.clear();
        self.next_id = 0;
        self.len = 0;
    }
}

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
