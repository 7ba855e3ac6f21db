//! Dynamic instancing: visible items → per-renderable batches → draws

mod render_batch;
mod batch_compiler;

pub use render_batch::{RenderBatch, InstanceBuffer, BatchDraw};
pub use batch_compiler::{RenderBatchCompiler, PassKind, BatchStats};
