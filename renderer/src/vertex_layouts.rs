/// Describes a vertex buffer layout using renderer-owned types.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: &'static [VertexAttribute],
}

impl VertexBufferLayout {
    /// Converts this layout into `wgpu::VertexBufferLayout`.
    ///
    /// `wgpu_attributes` should be created with [VertexBufferLayout::wgpu_attributes] and must
    /// live at least as long as the returned `wgpu::VertexBufferLayout`.
    pub fn to_wgpu<'a>(
        &self,
        wgpu_attributes: &'a [wgpu::VertexAttribute],
    ) -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: wgpu_attributes,
        }
    }

    pub fn wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes.iter().map(|a| a.to_wgpu()).collect()
    }
}

/// Trait implemented by vertex types that can be bound as a vertex buffer.
pub trait AsVertexLayout {
    fn vertex_buffer_layout() -> VertexBufferLayout;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
}

impl VertexAttribute {
    pub fn to_wgpu(self) -> wgpu::VertexAttribute {
        wgpu::VertexAttribute {
            format: self.format.to_wgpu(),
            offset: self.offset,
            shader_location: self.shader_location,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Uint32,
    /// Four normalized bytes, read as `vec4<f32>` in the shader.
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        self.to_wgpu().size()
    }

    pub fn to_wgpu(self) -> wgpu::VertexFormat {
        match self {
            Self::Float32x2 => wgpu::VertexFormat::Float32x2,
            Self::Float32x3 => wgpu::VertexFormat::Float32x3,
            Self::Uint32 => wgpu::VertexFormat::Uint32,
            Self::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
        }
    }
}
