/// Graphics backend seam: everything the visibility engine asks of the GPU

pub mod buffer;
pub mod graphics_backend;

#[cfg(test)]
pub mod mock_backend;

pub use buffer::*;
pub use graphics_backend::*;
