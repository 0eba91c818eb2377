//! Textured, alpha-blended panorama meshes.
//!
//! GPU resources are cached by the scene's process-unique ids and evicted as
//! soon as a frame no longer references them.

use super::FrameMesh;
use crate::camera::Camera;
use std::collections::{HashMap, HashSet};
use streetview::geometry::{Geometry, GeometryId, Vertex};
use streetview::scene::ObjectId;
use streetview::texture::{Texture, TextureId};
use wgpu::util::DeviceExt;

/// Must match `Camera` in `panorama.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

/// Must match `Mesh` in `panorama.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct MeshUniform {
    pub model: [[f32; 4]; 4],
    /// `(scale_x, scale_y, shift_y, opacity)`
    pub uv_opacity: [f32; 4],
}

impl MeshUniform {
    pub fn from_frame(m: &FrameMesh) -> Self {
        let uv = m.mesh.material.uv;
        Self {
            model: m.model.to_cols_array_2d(),
            uv_opacity: [uv.scale_x, uv.scale_y, uv.shift_y, m.mesh.material.opacity],
        }
    }
}

type MeshKey = (ObjectId, usize);

struct GpuGeometry {
    vtx: wgpu::Buffer,
    idx: wgpu::Buffer,
    index_count: u32,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind: wgpu::BindGroup,
}

struct GpuMesh {
    ubo: wgpu::Buffer,
    bind: wgpu::BindGroup,
}

struct Draw {
    geometry: GeometryId,
    texture: TextureId,
    mesh: MeshKey,
}

pub struct PanoramaPipeline {
    pipeline: wgpu::RenderPipeline,
    camera_ubo: wgpu::Buffer,
    camera_bind: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    mesh_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    geometries: HashMap<GeometryId, GpuGeometry>,
    textures: HashMap<TextureId, GpuTexture>,
    meshes: HashMap<MeshKey, GpuMesh>,
    draws: Vec<Draw>,
    max_texture_size: u32,
    /// Textures already reported as too large.
    oversized: HashSet<TextureId>,
}

/// Whether `t` can become a GPU texture on a device limited to `max` texels
/// per side.
fn uploadable(t: &Texture, max: u32) -> bool {
    (1..=max).contains(&t.width()) && (1..=max).contains(&t.height())
}

fn uniform_entry(visibility: wgpu::ShaderStages, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

impl PanoramaPipeline {
    pub fn new(device: &wgpu::Device, color_fmt: wgpu::TextureFormat) -> Self {
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Panorama Camera Layout"),
            entries: &[uniform_entry(
                wgpu::ShaderStages::VERTEX,
                std::mem::size_of::<CameraUniform>(),
            )],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Panorama Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Panorama Mesh Layout"),
            entries: &[uniform_entry(
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                std::mem::size_of::<MeshUniform>(),
            )],
        });

        let camera_ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panorama Camera UBO"),
            contents: bytemuck::bytes_of(&CameraUniform {
                view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Panorama Camera Bind"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_ubo.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Panorama Tile Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shaders/panorama.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/panorama.wgsl").into()),
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position (vec3)
                wgpu::VertexAttribute {
                    shader_location: 0,
                    offset: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // UV (vec2), after the normal
                wgpu::VertexAttribute {
                    shader_location: 1,
                    offset: 24,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        };

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Panorama PipelineLayout"),
            bind_group_layouts: &[&camera_layout, &texture_layout, &mesh_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Panorama Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[vertex_layout],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            // Seen from inside; both faces are drawn.
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            // Everything sits on one sphere; ordering comes from render order alone.
            depth_stencil: None,
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_fmt,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            camera_ubo,
            camera_bind,
            texture_layout,
            mesh_layout,
            sampler,
            geometries: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            draws: Vec::new(),
            max_texture_size: device.limits().max_texture_dimension_2d,
            oversized: HashSet::new(),
        }
    }

    fn upload_geometry(device: &wgpu::Device, g: &Geometry) -> GpuGeometry {
        GpuGeometry {
            vtx: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Panorama VB"),
                contents: bytemuck::cast_slice(&g.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            idx: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Panorama IB"),
                contents: bytemuck::cast_slice(&g.indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: g.indices.len() as u32,
        }
    }

    fn upload_texture(&self, device: &wgpu::Device, queue: &wgpu::Queue, t: &Texture) -> GpuTexture {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(t.source.as_str()),
                size: wgpu::Extent3d {
                    width: t.width(),
                    height: t.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            t.image.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Panorama Texture Bind"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        GpuTexture {
            _texture: texture,
            bind,
        }
    }

    fn create_mesh(&self, device: &wgpu::Device, data: &MeshUniform) -> GpuMesh {
        let ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panorama Mesh UBO"),
            contents: bytemuck::bytes_of(data),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Panorama Mesh Bind"),
            layout: &self.mesh_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            }],
        });
        GpuMesh { ubo, bind }
    }

    /// Uploads whatever `frame` needs, refreshes per-mesh uniforms and drops
    /// resources the frame no longer uses.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        camera: &Camera,
        frame: &[FrameMesh],
    ) {
        queue.write_buffer(
            &self.camera_ubo,
            0,
            bytemuck::bytes_of(&CameraUniform {
                view_proj: camera.view_proj().to_cols_array_2d(),
            }),
        );

        self.draws.clear();
        let mut used_geometry = HashSet::new();
        let mut used_textures = HashSet::new();
        let mut used_meshes = HashSet::new();

        for fm in frame {
            let texture = &fm.mesh.material.texture;
            if !uploadable(texture, self.max_texture_size) {
                if self.oversized.insert(texture.id) {
                    tracing::warn!(
                        source = %texture.source,
                        width = texture.width(),
                        height = texture.height(),
                        max = self.max_texture_size,
                        "Skipping texture the GPU cannot hold"
                    );
                }
                continue;
            }
            let geometry = &fm.mesh.geometry;

            if !self.geometries.contains_key(&geometry.id) {
                self.geometries
                    .insert(geometry.id, Self::upload_geometry(device, geometry));
            }
            if !self.textures.contains_key(&texture.id) {
                let gpu = self.upload_texture(device, queue, texture);
                self.textures.insert(texture.id, gpu);
            }

            let uniform = MeshUniform::from_frame(fm);
            match self.meshes.get(&fm.key) {
                Some(mesh) => queue.write_buffer(&mesh.ubo, 0, bytemuck::bytes_of(&uniform)),
                None => {
                    let mesh = self.create_mesh(device, &uniform);
                    self.meshes.insert(fm.key, mesh);
                }
            }

            used_geometry.insert(geometry.id);
            used_textures.insert(texture.id);
            used_meshes.insert(fm.key);
            self.draws.push(Draw {
                geometry: geometry.id,
                texture: texture.id,
                mesh: fm.key,
            });
        }

        self.geometries.retain(|id, _| used_geometry.contains(id));
        self.textures.retain(|id, _| used_textures.contains(id));
        self.meshes.retain(|key, _| used_meshes.contains(key));
    }

    /// Records the draws of the last [`prepare`](Self::prepare), in order.
    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.camera_bind, &[]);

        for d in &self.draws {
            let (Some(g), Some(t), Some(m)) = (
                self.geometries.get(&d.geometry),
                self.textures.get(&d.texture),
                self.meshes.get(&d.mesh),
            ) else {
                continue;
            };
            rpass.set_bind_group(1, &t.bind, &[]);
            rpass.set_bind_group(2, &m.bind, &[]);
            rpass.set_vertex_buffer(0, g.vtx.slice(..));
            rpass.set_index_buffer(g.idx.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..g.index_count, 0, 0..1);
        }
    }
}
