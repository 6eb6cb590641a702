//! Offscreen rendering of the terrain with normals as colors, used to exercise the streaming
//! path on a headless device.

use glam::UVec2;
use renderer::{AsVertexLayout, BufferDescriptor, BufferId, BufferUsages, Renderer, RendererError};

use super::geometry::{DrawStats, TerrainGeometry};
use super::patch::TerrainVertex;
use super::Terrain;
use crate::engine::camera::Camera;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub struct TerrainPreview {
    pipeline: wgpu::RenderPipeline,
    uniforms: BufferId,
    bind_group: wgpu::BindGroup,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl TerrainPreview {
    pub fn new(renderer: &mut Renderer, size: UVec2) -> Result<Self, RendererError> {
        let device = renderer.device();

        let module = device.create_shader_module(wgpu::include_wgsl!("preview.wgsl"));

        let layout = TerrainVertex::vertex_buffer_layout();
        let attributes = layout.wgpu_attributes();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("terrain_preview_render_pipeline"),
            layout: None,
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vertex_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[layout.to_wgpu(&attributes)],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fragment_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let create_view = |label: &str, format: wgpu::TextureFormat| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: size.x.max(1),
                        height: size.y.max(1),
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };

        let color_view = create_view("terrain_preview_color", COLOR_FORMAT);
        let depth_view = create_view("terrain_preview_depth", DEPTH_FORMAT);

        let uniforms = renderer.create_buffer(BufferDescriptor {
            label: "terrain_preview_uniforms".to_string(),
            size: std::mem::size_of::<glam::Mat4>() as u64,
            usages: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        })?;

        let bind_group = {
            let buffer = renderer
                .buffer(uniforms)
                .ok_or(RendererError::InvalidBuffer)?;
            renderer.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("terrain_preview_bind_group"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };

        Ok(Self {
            pipeline,
            uniforms,
            bind_group,
            color_view,
            depth_view,
        })
    }

    /// Draw the `visible` patches of `terrain` as seen by `camera`.
    pub fn render(
        &self,
        renderer: &Renderer,
        terrain: &Terrain,
        geometry: &mut TerrainGeometry,
        camera: &Camera,
        visible: &[usize],
    ) -> Result<DrawStats, RendererError> {
        let view_projection = camera.matrices().view_projection;
        renderer.write_buffer(self.uniforms, 0, bytemuck::bytes_of(&view_projection))?;

        terrain.draw_patches(
            geometry,
            renderer,
            visible,
            camera.position(),
            camera.far(),
            |encoder, batch| self.begin_pass(encoder, batch),
        )
    }

    fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        batch: usize,
    ) -> wgpu::RenderPass<'e> {
        // Later batches draw over the first one.
        let (color_load, depth_load) = if batch == 0 {
            (wgpu::LoadOp::Clear(wgpu::Color::BLACK), wgpu::LoadOp::Clear(1.0))
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("terrain_preview_render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass
    }

    pub fn destroy(self, renderer: &mut Renderer) {
        renderer.destroy_buffer(self.uniforms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{LEVEL_COUNT, PATCH_VERTEX_COUNT, Patch, VB_PATCH_COUNT, level_range};

    #[test]
    fn draws_more_patches_than_slots_in_batches() {
        // Machines without an adapter can't run this.
        let Ok(mut renderer) = Renderer::headless() else {
            return;
        };

        let mut geometry = TerrainGeometry::new(&mut renderer).unwrap();
        let preview = TerrainPreview::new(&mut renderer, UVec2::new(64, 64)).unwrap();
        renderer
            .write_buffer(preview.uniforms, 0, bytemuck::bytes_of(&glam::Mat4::IDENTITY))
            .unwrap();

        let patches: Vec<Patch> = (0..VB_PATCH_COUNT + 4)
            .map(|_| Patch {
                min_y: 0.0,
                max_y: 0.0,
                forms: Default::default(),
                vertices: vec![TerrainVertex::default(); PATCH_VERTEX_COUNT as usize]
                    .into_boxed_slice(),
            })
            .collect();
        let draws: Vec<_> = (0..patches.len()).map(|i| (i, i % LEVEL_COUNT)).collect();

        let stats = geometry
            .draw_patches(&renderer, &patches, &draws, |encoder, batch| {
                preview.begin_pass(encoder, batch)
            })
            .unwrap();

        assert_eq!(stats.patches, patches.len());
        assert_eq!(stats.batches, 2);
        let triangles: usize = draws
            .iter()
            .map(|&(_, level)| level_range(level).len() / 3)
            .sum();
        assert_eq!(stats.triangles, triangles);

        preview.destroy(&mut renderer);
        geometry.destroy(&mut renderer);
    }
}
