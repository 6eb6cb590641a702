//! A wrapper around `wgpu` primitives used to hold geometry on the GPU.

mod buffers;
mod vertex_layouts;

pub use buffers::*;
pub use vertex_layouts::*;

use generational_arena::Arena;

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,

    buffers: Arena<BufferEntry>,
}

impl Renderer {
    /// Creates a new renderer wrapper around a `wgpu` device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: Arena::default(),
        }
    }

    /// Request an adapter and device without a surface. Used by tools that only need buffers.
    pub fn headless() -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(RendererError::NoAdapter)?;

        tracing::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .map_err(|err| RendererError::Device(err.to_string()))?;

        Ok(Self::new(device, queue))
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Creates a buffer and returns its handle. Allocation and validation failures reported by
    /// the device are returned as errors instead of being raised on the device error handler.
    pub fn create_buffer(&mut self, descriptor: BufferDescriptor) -> Result<BufferId, RendererError> {
        let buffer = self.checked(&descriptor.label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&descriptor.label),
                size: descriptor.size,
                usage: descriptor.usages,
                mapped_at_creation: false,
            })
        })?;

        Ok(BufferId(self.buffers.insert(BufferEntry { descriptor, buffer })))
    }

    /// Creates a buffer filled with `contents`. `COPY_DST` is always added to the usages.
    pub fn create_buffer_init(
        &mut self,
        label: impl Into<String>,
        usages: BufferUsages,
        contents: &[u8],
    ) -> Result<BufferId, RendererError> {
        let size = (contents.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let id = self.create_buffer(BufferDescriptor {
            label: label.into(),
            size,
            usages: usages | BufferUsages::COPY_DST,
        })?;

        // Queue writes must be a multiple of the copy alignment.
        if size == contents.len() as u64 {
            self.write_buffer(id, 0, contents)?;
        } else {
            let mut padded = contents.to_vec();
            padded.resize(size as usize, 0);
            self.write_buffer(id, 0, &padded)?;
        }
        Ok(id)
    }

    /// Writes `data` into the buffer at `offset` bytes. The write is ordered before any work
    /// submitted to the queue afterwards.
    pub fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), RendererError> {
        let entry = self
            .buffers
            .get(id.0)
            .ok_or(RendererError::InvalidBuffer)?;

        if offset + data.len() as u64 > entry.descriptor.size {
            return Err(RendererError::OutOfBounds {
                label: entry.descriptor.label.clone(),
                offset,
                len: data.len() as u64,
                size: entry.descriptor.size,
            });
        }

        self.queue.write_buffer(&entry.buffer, offset, data);
        Ok(())
    }

    #[inline]
    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(id.0).map(|entry| &entry.buffer)
    }

    #[inline]
    pub fn buffer_descriptor(&self, id: BufferId) -> Option<&BufferDescriptor> {
        self.buffers.get(id.0).map(|entry| &entry.descriptor)
    }

    /// Releases the buffer. The handle becomes invalid.
    pub fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(entry) = self.buffers.remove(id.0) {
            entry.buffer.destroy();
        }
    }

    fn checked<T>(&self, label: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, RendererError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let result = f(&self.device);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if let Some(err) = out_of_memory.or(validation) {
            tracing::warn!("Could not create \"{label}\": {err}");
            return Err(RendererError::Creation {
                label: label.to_string(),
                message: err.to_string(),
            });
        }

        Ok(result)
    }
}

struct BufferEntry {
    descriptor: BufferDescriptor,
    buffer: wgpu::Buffer,
}
