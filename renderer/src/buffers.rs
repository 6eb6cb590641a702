pub use wgpu::BufferUsages;

/// Handle to a buffer tracked by the renderer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BufferId(pub generational_arena::Index);

#[derive(Clone, Debug)]
pub struct BufferDescriptor {
    pub label: String,
    pub size: u64,
    pub usages: BufferUsages,
}

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("No suitable graphics adapter found")]
    NoAdapter,

    #[error("Could not request device: {0}")]
    Device(String),

    #[error("Could not create \"{label}\": {message}")]
    Creation { label: String, message: String },

    #[error("Invalid buffer handle")]
    InvalidBuffer,

    #[error("Write of {len} bytes at {offset} exceeds buffer \"{label}\" ({size} bytes)")]
    OutOfBounds {
        label: String,
        offset: u64,
        len: u64,
        size: u64,
    },
}
