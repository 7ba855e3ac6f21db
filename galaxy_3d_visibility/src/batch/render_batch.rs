/// Per-renderable batch persisted across passes, and the draws it resolves to.

use std::fmt;
use std::sync::Arc;
use glam::Mat4;
use crate::backend::Buffer;
use crate::spatial::{ItemKey, Renderable};

/// GPU buffer holding per-instance transforms. Capacity only grows.
pub struct InstanceBuffer {
    buffer: Arc<dyn Buffer>,
    /// Number of transforms the buffer can hold
    capacity: u32,
}

impl InstanceBuffer {
    pub(crate) fn new(buffer: Arc<dyn Buffer>, capacity: u32) -> Self {
        Self { buffer, capacity }
    }

    pub fn buffer(&self) -> &Arc<dyn Buffer> {
        &self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Items sharing one renderable, collected during a pass.
///
/// Slots are reused between passes: `count` restarts at 0 on the first
/// append of a new pass, and `changed` is raised only when a slot receives a
/// different item or transform, so a static batch uploads nothing.
pub struct RenderBatch {
    renderable: Renderable,
    items: Vec<ItemKey>,
    /// CPU copy of the instance data, slot-aligned with `items`
    transforms: Vec<Mat4>,
    count: usize,
    instance_buffer: Option<InstanceBuffer>,
    changed: bool,
    /// Pass whose items are currently in the slots
    pass: u64,
    last_used_pass: u64,
}

impl RenderBatch {
    pub fn new(renderable: Renderable) -> Self {
        Self {
            renderable,
            items: Vec::new(),
            transforms: Vec::new(),
            count: 0,
            instance_buffer: None,
            changed: false,
            pass: 0,
            last_used_pass: 0,
        }
    }

    /// Add an item for `pass`. Returns true if this is the batch's first item of the pass.
    pub(crate) fn append(&mut self, pass: u64, key: ItemKey, transform: &Mat4) -> bool {
        let first = self.pass != pass;
        if first {
            self.pass = pass;
            self.last_used_pass = pass;
            self.count = 0;
        }

        let slot = self.count;
        if slot < self.items.len() {
            if self.items[slot] != key || self.transforms[slot] != *transform {
                self.items[slot] = key;
                self.transforms[slot] = *transform;
                self.changed = true;
            }
        } else {
            self.items.push(key);
            self.transforms.push(*transform);
            self.changed = true;
        }
        self.count += 1;
        first
    }

    pub fn renderable(&self) -> &Renderable {
        &self.renderable
    }

    /// Items appended in the current pass
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn items(&self) -> &[ItemKey] {
        &self.items[..self.count]
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms[..self.count]
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn mark_uploaded(&mut self) {
        self.changed = false;
    }

    pub(crate) fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn instance_buffer(&self) -> Option<&InstanceBuffer> {
        self.instance_buffer.as_ref()
    }

    pub(crate) fn set_instance_buffer(&mut self, buffer: InstanceBuffer) {
        self.instance_buffer = Some(buffer);
    }

    /// Instance buffer capacity (0 without a buffer)
    pub fn capacity(&self) -> u32 {
        self.instance_buffer.as_ref().map_or(0, InstanceBuffer::capacity)
    }

    pub fn last_used_pass(&self) -> u64 {
        self.last_used_pass
    }
}

/// One resolved draw
#[derive(Clone)]
pub enum BatchDraw {
    /// A lone item, drawn with its own transform
    Single { renderable: Renderable, transform: Mat4 },
    /// `count` items read from an instance buffer
    Instanced { renderable: Renderable, instances: Arc<dyn Buffer>, count: u32 },
}

impl BatchDraw {
    pub fn renderable(&self) -> &Renderable {
        match self {
            BatchDraw::Single { renderable, .. } => renderable,
            BatchDraw::Instanced { renderable, .. } => renderable,
        }
    }

    /// Items covered by this draw
    pub fn item_count(&self) -> u32 {
        match self {
            BatchDraw::Single { .. } => 1,
            BatchDraw::Instanced { count, .. } => *count,
        }
    }
}

impl fmt::Debug for BatchDraw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchDraw::Single { renderable, transform } => f
                .debug_struct("Single")
                .field("renderable", renderable)
                .field("transform", transform)
                .finish(),
            BatchDraw::Instanced { renderable, count, .. } => f
                .debug_struct("Instanced")
                .field("renderable", renderable)
                .field("count", count)
                .finish(),
        }
    }
}
