//! GPU Stream Rendering via wgpu
//!
//! Each stream gets its own texture. 8-bit formats upload as RGBA8,
//! everything deeper as RGBA32F so windowing keeps full precision.
//! Views are drawn into their layout region with `set_viewport`, then
//! selection rectangles go on top as lines.

use std::sync::Arc;

use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::pixel_format::{pixel_to_rgba, ChannelType, PixelFormat};
use crate::stream::ImageRef;
use crate::view::{StreamView, XYRange};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Surface creation failed: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("No suitable GPU adapter")]
    NoAdapter,
    #[error("Device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("Surface error: {0}")]
    Frame(#[from] wgpu::SurfaceError),
    #[error("Surface is not supported by the GPU adapter")]
    IncompatibleSurface,
}

// ============================================================================
// Pixel Format Descriptor
// ============================================================================

/// How a stream's pixels are laid out on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuPixelFormat {
    pub source: PixelFormat,
    pub texture_format: wgpu::TextureFormat,
    pub bytes_per_texel: u32,
}

impl GpuPixelFormat {
    pub fn for_format(source: PixelFormat) -> Self {
        match source.channel_type() {
            ChannelType::U8 => Self {
                source,
                texture_format: wgpu::TextureFormat::Rgba8Unorm,
                bytes_per_texel: 4,
            },
            ChannelType::U16 | ChannelType::F32 => Self {
                source,
                texture_format: wgpu::TextureFormat::Rgba32Float,
                bytes_per_texel: 16,
            },
        }
    }
}

/// Expand `image` to the texel layout of `format` into `out`, reusing its
/// allocation. Gray is replicated to RGB; missing alpha is opaque.
pub fn pack_texels(image: ImageRef<'_>, format: &GpuPixelFormat, out: &mut Vec<u8>) {
    let bpp = image.format.bytes_per_pixel();
    out.clear();
    out.reserve(image.width as usize * image.height as usize * format.bytes_per_texel as usize);

    for y in 0..image.height {
        let row = image.row(y);
        match (image.format, format.texture_format) {
            (PixelFormat::RGBA32, wgpu::TextureFormat::Rgba8Unorm) => out.extend_from_slice(row),
            (PixelFormat::GRAY8, wgpu::TextureFormat::Rgba8Unorm) => {
                for &v in row {
                    out.extend_from_slice(&[v, v, v, 255]);
                }
            }
            (_, wgpu::TextureFormat::Rgba8Unorm) => {
                for px in row.chunks_exact(bpp) {
                    let rgba = pixel_to_rgba(image.format, px);
                    out.extend(rgba.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
                }
            }
            _ => {
                for px in row.chunks_exact(bpp) {
                    let rgba = pixel_to_rgba(image.format, px);
                    out.extend_from_slice(bytemuck::cast_slice(rgba.as_slice()));
                }
            }
        }
    }
}

// ============================================================================
// Vertex and Shader
// ============================================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    tex_coords: [f32; 2],
}

const VERTICES: &[Vertex] = &[
    Vertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
    Vertex { position: [ 1.0, -1.0], tex_coords: [1.0, 1.0] },
    Vertex { position: [ 1.0,  1.0], tex_coords: [1.0, 0.0] },
    Vertex { position: [-1.0,  1.0], tex_coords: [0.0, 0.0] },
];

const INDICES: &[u16] = &[0, 1, 2, 2, 3, 0];

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ViewUniform {
    uv_min: [f32; 2],
    uv_max: [f32; 2],
    offset: f32,
    scale: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct OverlayVertex {
    position: [f32; 2],
    color: [f32; 4],
}

const SELECTION_COLOR: [f32; 4] = [1.0, 0.8, 0.0, 1.0];

const SHADER_IMAGE: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

struct ViewParams {
    uv_min: vec2<f32>,
    uv_max: vec2<f32>,
    offset: f32,
    scale: f32,
    pad: vec2<f32>,
}

@group(0) @binding(0) var t_image: texture_2d<f32>;
@group(0) @binding(1) var s_image: sampler;
@group(0) @binding(2) var<uniform> params: ViewParams;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = mix(params.uv_min, params.uv_max, in.tex_coords);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let c = textureSample(t_image, s_image, in.tex_coords);
    return vec4<f32>(c.rgb * params.scale + vec3<f32>(params.offset), 1.0);
}
"#;

const SHADER_OVERLAY: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) color: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

/// Texture coordinates of the visible part of a `width x height` image
fn view_uv(view: &XYRange, width: u32, height: u32) -> ([f32; 2], [f32; 2]) {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    (
        [(view.x_min + 0.5) / w, (view.y_min + 0.5) / h],
        [(view.x_max + 0.5) / w, (view.y_max + 0.5) / h],
    )
}

/// Selection outline as a line list in the view's clip space
fn selection_lines(view: &StreamView) -> Vec<OverlayVertex> {
    let sel = view.selection;
    if !sel.is_finite() || sel.area().abs() <= 0.0 {
        return Vec::new();
    }
    let v = view.view_to_render();
    let to_clip = |x: f32, y: f32| {
        [
            (x - v.x_min) / v.width() * 2.0 - 1.0,
            1.0 - (y - v.y_min) / v.height() * 2.0,
        ]
    };
    let corners = [
        to_clip(sel.x_min, sel.y_min),
        to_clip(sel.x_max, sel.y_min),
        to_clip(sel.x_max, sel.y_max),
        to_clip(sel.x_min, sel.y_max),
    ];
    (0..4)
        .flat_map(|i| [corners[i], corners[(i + 1) % 4]])
        .map(|position| OverlayVertex { position, color: SELECTION_COLOR })
        .collect()
}

// ============================================================================
// GPU Renderer
// ============================================================================

struct StreamTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    uniform: wgpu::Buffer,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

/// Surface format and alpha mode. Raw values go straight to the screen, so
/// a linear format is preferred.
fn pick_surface_mode(
    caps: &wgpu::SurfaceCapabilities,
) -> Result<(wgpu::TextureFormat, wgpu::CompositeAlphaMode), RenderError> {
    let format = caps
        .formats
        .iter()
        .find(|f| !f.is_srgb())
        .or_else(|| caps.formats.first())
        .copied()
        .ok_or(RenderError::IncompatibleSurface)?;
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .ok_or(RenderError::IncompatibleSurface)?;
    Ok((format, alpha_mode))
}

pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,

    image_pipeline: wgpu::RenderPipeline,
    image_bind_group_layout: wgpu::BindGroupLayout,
    overlay_pipeline: wgpu::RenderPipeline,

    // Geometry
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,

    sampler: wgpu::Sampler,

    // One per stream, created on first upload
    textures: Vec<Option<StreamTexture>>,
    staging: Vec<u8>,

    width: u32,
    height: u32,
}

impl GpuRenderer {
    /// Create renderer for a window showing `stream_count` streams
    pub async fn new(window: Arc<winit::window::Window>, stream_count: usize) -> Result<Self, RenderError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    label: Some("vidview_device"),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let (surface_format, alpha_mode) = pick_surface_mode(&surface_caps)?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        // Nearest so individual pixels stay visible when zoomed
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let image_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        // Rgba32Float is not filterable without a feature
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
            label: Some("image_bind_group_layout"),
        });

        let image_vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        };

        let overlay_vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<OverlayVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        };

        let image_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("image_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_IMAGE.into()),
        });

        let image_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("image_pipeline_layout"),
            bind_group_layouts: &[&image_bind_group_layout],
            push_constant_ranges: &[],
        });

        let image_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("image_pipeline"),
            layout: Some(&image_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &image_shader,
                entry_point: Some("vs_main"),
                buffers: &[image_vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &image_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_OVERLAY.into()),
        });

        let overlay_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay_pipeline_layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay_pipeline"),
            layout: Some(&overlay_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &overlay_shader,
                entry_point: Some("vs_main"),
                buffers: &[overlay_vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &overlay_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vertex_buffer"),
            contents: bytemuck::cast_slice(VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("index_buffer"),
            contents: bytemuck::cast_slice(INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        tracing::info!("GPU renderer ready ({:?}, {} streams)", surface_format, stream_count);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            image_pipeline,
            image_bind_group_layout,
            overlay_pipeline,
            vertex_buffer,
            index_buffer,
            sampler,
            textures: (0..stream_count).map(|_| None).collect(),
            staging: Vec::new(),
            width: size.width,
            height: size.height,
        })
    }

    /// Resize surface
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload one stream's image, recreating its texture if the size or
    /// format changed
    pub fn upload(&mut self, index: usize, image: ImageRef<'_>, format: &GpuPixelFormat) {
        if image.width == 0 || image.height == 0 || !image.is_complete() {
            return;
        }
        if index >= self.textures.len() {
            self.textures.resize_with(index + 1, || None);
        }

        let stale = match &self.textures[index] {
            Some(t) => t.width != image.width || t.height != image.height || t.format != format.texture_format,
            None => true,
        };
        if stale {
            self.textures[index] = Some(self.create_stream_texture(image.width, image.height, format.texture_format));
        }

        pack_texels(image, format, &mut self.staging);
        let Some(target) = &self.textures[index] else {
            return;
        };

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.staging,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(format.bytes_per_texel * image.width),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_stream_texture(&self, width: u32, height: u32, format: wgpu::TextureFormat) -> StreamTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("stream_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let uniform = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("view_uniform"),
            size: std::mem::size_of::<ViewUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stream_bind_group"),
            layout: &self.image_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        tracing::debug!("Created {}x{} {:?} stream texture", width, height, format);

        StreamTexture {
            texture,
            bind_group,
            uniform,
            width,
            height,
            format,
        }
    }

    /// Clamp a layout region to the surface, `None` if nothing is left
    fn viewport(&self, view: &StreamView) -> Option<(f32, f32, f32, f32)> {
        let r = view.region;
        let x0 = r.x.max(0.0);
        let y0 = r.y.max(0.0);
        let x1 = (r.x + r.width).min(self.surface_config.width as f32);
        let y1 = (r.y + r.height).min(self.surface_config.height as f32);
        (x1 - x0 >= 1.0 && y1 - y0 >= 1.0).then_some((x0, y0, x1 - x0, y1 - y0))
    }

    /// Draw every shown view into its region, then selection outlines
    pub fn render(&mut self, views: &[StreamView]) -> Result<(), RenderError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let target = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        for (view, texture) in views.iter().zip(&self.textures) {
            let Some(texture) = texture else { continue };
            let (uv_min, uv_max) = view_uv(&view.view_to_render(), texture.width, texture.height);
            let uniform = ViewUniform {
                uv_min,
                uv_max,
                offset: view.offset_scale.offset,
                scale: view.offset_scale.scale,
                _pad: [0.0; 2],
            };
            self.queue.write_buffer(&texture.uniform, 0, bytemuck::bytes_of(&uniform));
        }

        // Per-view selection outlines packed into one buffer
        let mut overlay = Vec::new();
        let mut overlay_ranges = Vec::with_capacity(views.len());
        for view in views {
            let start = overlay.len() as u32;
            if view.shown {
                overlay.extend(selection_lines(view));
            }
            overlay_ranges.push(start..overlay.len() as u32);
        }
        let overlay_buffer = (!overlay.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("overlay_buffer"),
                contents: bytemuck::cast_slice(&overlay),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.image_pipeline);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            for (view, texture) in views.iter().zip(&self.textures) {
                let (Some(texture), true) = (texture, view.shown) else { continue };
                let Some((x, y, w, h)) = self.viewport(view) else { continue };
                render_pass.set_viewport(x, y, w, h, 0.0, 1.0);
                render_pass.set_bind_group(0, &texture.bind_group, &[]);
                render_pass.draw_indexed(0..INDICES.len() as u32, 0, 0..1);
            }

            if let Some(buffer) = &overlay_buffer {
                render_pass.set_pipeline(&self.overlay_pipeline);
                render_pass.set_vertex_buffer(0, buffer.slice(..));
                for (view, range) in views.iter().zip(&overlay_ranges) {
                    if range.is_empty() {
                        continue;
                    }
                    let Some((x, y, w, h)) = self.viewport(view) else { continue };
                    render_pass.set_viewport(x, y, w, h, 0.0, 1.0);
                    render_pass.draw(range.clone(), 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
