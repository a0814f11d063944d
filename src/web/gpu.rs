//! WebGPU-backed vector surface.
//!
//! The adapter and device are requested once at mount (that part is async)
//! and shared by every canvas the provider creates, so acquiring a vector
//! surface during a scene switch stays synchronous. On device loss the
//! context is recreated in the background and its generation bumped; each
//! surface rebinds (wgpu surface, pipeline) lazily and drops buffers made
//! under the old device.

use crate::constants::CAMERA_FOVY;
use crate::surface::{BufferId, Instance, Rgba, VectorSurface};
use fnv::FnvHashMap;
use glam::Mat4;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use web_sys as web;

static BILLBOARD_WGSL: &str = include_str!("../../shaders/billboard.wgsl");

const INSTANCE_ATTRS: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32, 2 => Float32x4];

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BillboardUniforms {
    view_proj: [[f32; 4]; 4],
    scale: [f32; 2],
    _pad: [f32; 2],
}

pub struct GpuContext {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
    generation: u64,
    recovering: bool,
}

pub type SharedGpu = Rc<RefCell<GpuContext>>;

async fn request_device(
    instance: &wgpu::Instance,
) -> anyhow::Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue, Arc<AtomicBool>)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No WebGPU adapter"))?;
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                label: Some("midi_viz_device"),
            },
            None,
        )
        .await
        .map_err(|e| anyhow::anyhow!(format!("request_device error: {:?}", e)))?;
    let lost = Arc::new(AtomicBool::new(false));
    let flag = lost.clone();
    device.set_device_lost_callback(move |reason, message| {
        log::warn!("GPU device lost ({reason:?}): {message}");
        flag.store(true, Ordering::Release);
    });
    Ok((adapter, device, queue, lost))
}

impl GpuContext {
    pub async fn new() -> anyhow::Result<SharedGpu> {
        let instance = wgpu::Instance::default();
        let (adapter, device, queue, lost) = request_device(&instance).await?;
        log::info!("WebGPU adapter: {:?}", adapter.get_info().name);
        Ok(Rc::new(RefCell::new(Self {
            instance,
            adapter,
            device,
            queue,
            lost,
            generation: 1,
            recovering: false,
        })))
    }

    pub fn is_lost(&self) -> bool {
        self.recovering || self.lost.load(Ordering::Acquire)
    }

    /// Start recreating the device if it was lost and no attempt is running.
    pub fn recover(gpu: &SharedGpu) {
        let Ok(mut g) = gpu.try_borrow_mut() else {
            return;
        };
        if g.recovering || !g.lost.load(Ordering::Acquire) {
            return;
        }
        g.recovering = true;
        drop(g);
        let weak = Rc::downgrade(gpu);
        wasm_bindgen_futures::spawn_local(async move {
            let instance = wgpu::Instance::default();
            let result = request_device(&instance).await;
            let Some(gpu) = weak.upgrade() else {
                return;
            };
            let Ok(mut g) = gpu.try_borrow_mut() else {
                return;
            };
            match result {
                Ok((adapter, device, queue, lost)) => {
                    g.instance = instance;
                    g.adapter = adapter;
                    g.device = device;
                    g.queue = queue;
                    g.lost = lost;
                    g.generation += 1;
                    g.recovering = false;
                    log::info!("GPU device recreated (generation {})", g.generation);
                }
                // Stays lost; vector scenes keep skipping draws.
                Err(e) => log::error!("GPU device recovery failed: {e:?}"),
            }
        });
    }
}

struct Bound {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    generation: u64,
}

fn create_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
) -> (wgpu::RenderPipeline, wgpu::Buffer, wgpu::BindGroup) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("billboard_shader"),
        source: wgpu::ShaderSource::Wgsl(BILLBOARD_WGSL.into()),
    });
    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("billboard_bgl"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });
    let pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("billboard_pl"),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let additive = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent::OVER,
    };
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("billboard_pipeline"),
        layout: Some(&pl),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Instance>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &INSTANCE_ATTRS,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(additive),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        cache: None,
        multiview: None,
    });
    let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("billboard_uniforms"),
        size: std::mem::size_of::<BillboardUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("billboard_bg"),
        layout: &bgl,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }],
    });
    (pipeline, uniforms, bind_group)
}

pub struct GpuSurface {
    gpu: SharedGpu,
    canvas: web::HtmlCanvasElement,
    bound: Option<Bound>,
    buffers: FnvHashMap<BufferId, (wgpu::Buffer, usize)>,
    next_buffer: BufferId,
}

impl GpuSurface {
    pub fn new(gpu: SharedGpu, canvas: web::HtmlCanvasElement) -> Self {
        let mut s = Self {
            gpu,
            canvas,
            bound: None,
            buffers: FnvHashMap::default(),
            next_buffer: 1,
        };
        if let Err(e) = s.bind() {
            log::error!("WebGPU surface setup failed: {e:?}");
        }
        s
    }

    /// (Re)create everything tied to the current device generation.
    fn bind(&mut self) -> anyhow::Result<()> {
        let g = self.gpu.try_borrow().map_err(|e| anyhow::anyhow!("{e}"))?;
        if g.is_lost() {
            anyhow::bail!("device lost");
        }
        if matches!(&self.bound, Some(b) if b.generation == g.generation) {
            return Ok(());
        }
        // Buffers from the previous device are already gone.
        self.buffers.clear();
        let surface = g
            .instance
            .create_surface(wgpu::SurfaceTarget::Canvas(self.canvas.clone()))?;
        let caps = surface.get_capabilities(&g.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| {
                matches!(
                    f,
                    wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Rgba8Unorm
                )
            })
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("surface reports no formats"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: self.canvas.width().max(1),
            height: self.canvas.height().max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&g.device, &config);
        let (pipeline, uniforms, bind_group) = create_pipeline(&g.device, format);
        self.bound = Some(Bound {
            surface,
            config,
            pipeline,
            uniforms,
            bind_group,
            generation: g.generation,
        });
        Ok(())
    }

    fn usable(&mut self) -> bool {
        if self.is_lost() {
            return false;
        }
        self.bind().is_ok()
    }
}

impl VectorSurface for GpuSurface {
    fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn set_size(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        let Ok(g) = self.gpu.try_borrow() else {
            return;
        };
        if let Some(b) = self.bound.as_mut() {
            b.config.width = width;
            b.config.height = height;
            if !g.is_lost() && b.generation == g.generation {
                b.surface.configure(&g.device, &b.config);
            }
        }
    }

    fn is_lost(&self) -> bool {
        let lost = self.gpu.try_borrow().map(|g| g.is_lost()).unwrap_or(true);
        if lost {
            GpuContext::recover(&self.gpu);
        }
        lost
    }

    fn generation(&self) -> u64 {
        self.gpu.try_borrow().map(|g| g.generation).unwrap_or(0)
    }

    fn create_instance_buffer(&mut self, capacity: usize) -> Option<BufferId> {
        if !self.usable() {
            return None;
        }
        let g = self.gpu.try_borrow().ok()?;
        let buffer = g.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instances"),
            size: (capacity.max(1) * std::mem::size_of::<Instance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(id, (buffer, capacity));
        Some(id)
    }

    fn write_instances(&mut self, buffer: BufferId, instances: &[Instance]) {
        if !self.usable() {
            return;
        }
        let (Some((buf, cap)), Ok(g)) = (self.buffers.get(&buffer), self.gpu.try_borrow()) else {
            return;
        };
        let n = instances.len().min(*cap);
        if n > 0 {
            g.queue
                .write_buffer(buf, 0, bytemuck::cast_slice(&instances[..n]));
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some((buf, _)) = self.buffers.remove(&buffer) {
            buf.destroy();
        }
    }

    fn draw(&mut self, buffer: BufferId, count: u32, view_proj: Mat4, clear: Rgba) {
        if !self.usable() {
            return;
        }
        let Ok(g) = self.gpu.try_borrow() else {
            return;
        };
        let (Some(b), Some((buf, cap))) = (self.bound.as_ref(), self.buffers.get(&buffer)) else {
            return;
        };
        let count = count.min(*cap as u32);
        let frame = match b.surface.get_current_texture() {
            Ok(f) => f,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                b.surface.configure(&g.device, &b.config);
                return;
            }
            Err(e) => {
                log::debug!("get_current_texture: {e:?}");
                return;
            }
        };
        let aspect = b.config.width as f32 / b.config.height.max(1) as f32;
        let sy = 1.0 / (CAMERA_FOVY * 0.5).tan();
        let u = BillboardUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            scale: [sy / aspect.max(1e-3), sy],
            _pad: [0.0; 2],
        };
        g.queue.write_buffer(&b.uniforms, 0, bytemuck::bytes_of(&u));

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = g
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("billboard_encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("billboard_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.r as f64,
                            g: clear.g as f64,
                            b: clear.b as f64,
                            a: clear.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if count > 0 {
                rpass.set_pipeline(&b.pipeline);
                rpass.set_bind_group(0, &b.bind_group, &[]);
                rpass.set_vertex_buffer(0, buf.slice(..));
                rpass.draw(0..4, 0..count);
            }
        }
        g.queue.submit(Some(encoder.finish()));
        frame.present();
    }
}

impl Drop for GpuSurface {
    fn drop(&mut self) {
        for (_, (buf, _)) in self.buffers.drain() {
            buf.destroy();
        }
    }
}
