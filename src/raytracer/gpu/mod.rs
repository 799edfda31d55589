//! Compute-shader backend. One dispatch accumulates exactly one sample per
//! pixel into a `W*H` vec4 storage buffer; readback averages, applies gamma
//! and quantizes. Any failure during `init` leaves the caller free to fall
//! back to the CPU path.

use thiserror::Error;

use crate::raytracer::bvh::FlatBvhNode;
use crate::raytracer::camera::Camera;
use crate::raytracer::color::clamp;
use crate::raytracer::Scene;

pub mod buffer;
pub mod types;

use buffer::{StorageBuffer, UniformBuffer};
use types::{block_bytes, GpuSphere, GpuUniforms};

const WORKGROUP_SIZE: u32 = 8;

#[derive(Error, Debug)]

pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to acquire a GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("compute pipeline rejected: {0}")]
    Pipeline(String),
    #[error("accumulation readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("readback channel closed before the buffer was mapped")]
    ReadbackChannel,
}

pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    uniforms: GpuUniforms,
    uniform_buffer: UniformBuffer,
    accumulation: StorageBuffer,
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
    total_samples: u32,
    current_sample: u32,
}

impl GpuRenderer {
    /// Compiles the compute program and uploads camera, spheres and the
    /// flat BVH once. The accumulation buffer starts zeroed.
    pub fn init(
        camera: &Camera,
        scene: &Scene,
        nodes: &[FlatBvhNode],
        total_samples: u32,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        log::info!("GPU adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pathtracer device"),
                features: wgpu::Features::empty(),
                limits: wgpu::Limits::default(),
            },
            None,
        ))?;

        let width = camera.image_width;
        let height = camera.image_height;
        let pixel_count = width as u64 * height as u64;

        let uniforms = GpuUniforms::new(camera, total_samples);
        let uniform_buffer = UniformBuffer::new_from_bytes(
            &device,
            bytemuck::bytes_of(&uniforms),
            0_u32,
            Some("camera uniforms"),
        );

        let spheres: Vec<GpuSphere> = scene.spheres.iter().map(GpuSphere::new).collect();
        let sphere_buffer = StorageBuffer::new_from_bytes(
            &device,
            &block_bytes(&spheres),
            1_u32,
            Some("sphere buffer"),
        );

        let bvh_buffer =
            StorageBuffer::new_from_bytes(&device, &block_bytes(nodes), 2_u32, Some("bvh buffer"));

        // vec4<f32> per pixel, zero-initialized
        let accumulation = StorageBuffer::new(
            &device,
            pixel_count * 16,
            3_u32,
            Some("accumulation buffer"),
        );

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: accumulation.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    uniform_buffer.layout(wgpu::ShaderStages::COMPUTE),
                    sphere_buffer.layout(wgpu::ShaderStages::COMPUTE, true),
                    bvh_buffer.layout(wgpu::ShaderStages::COMPUTE, true),
                    accumulation.layout(wgpu::ShaderStages::COMPUTE, false),
                ],
                label: Some("tracer layout"),
            });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[
                uniform_buffer.binding(),
                sphere_buffer.binding(),
                bvh_buffer.binding(),
                accumulation.binding(),
            ],
            label: Some("tracer bind group"),
        });

        // Shader and pipeline creation behind an error scope so a rejected
        // module surfaces as a fallback instead of an uncaptured error.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            source: wgpu::ShaderSource::Wgsl(include_str!("tracer.wgsl").into()),
            label: Some("tracer.wgsl"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
            label: Some("tracer pipeline layout"),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
            label: Some("tracer pipeline"),
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Pipeline(error.to_string()));
        }

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            uniforms,
            uniform_buffer,
            accumulation,
            staging,
            width,
            height,
            total_samples,
            current_sample: 0,
        })
    }

    /// Adds one sample per pixel. Write visibility for the following
    /// readback is established at the submission boundary.
    pub fn dispatch(&mut self) {
        self.current_sample += 1;
        self.uniforms.current_sample = self.current_sample as i32;
        self.queue.write_buffer(
            self.uniform_buffer.handle(),
            0,
            bytemuck::bytes_of(&self.uniforms),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tracer encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("tracer pass"),
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(
                (self.width + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE,
                (self.height + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE,
                1,
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn read_accumulation(&self) -> Result<Vec<[f32; 4]>, GpuError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_buffer_to_buffer(
            self.accumulation.handle(),
            0,
            &self.staging,
            0,
            self.accumulation.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver.recv().map_err(|_| GpuError::ReadbackChannel)??;

        let data = slice.get_mapped_range();
        let pixels: Vec<[f32; 4]> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        self.staging.unmap();
        Ok(pixels)
    }

    /// Running average in linear light, suitable for a progressive preview.
    pub fn readback_linear(&self) -> Result<Vec<[f32; 4]>, GpuError> {
        let inv = 1.0 / self.current_sample.max(1) as f32;
        let mut pixels = self.read_accumulation()?;
        for pixel in &mut pixels {
            pixel[0] *= inv;
            pixel[1] *= inv;
            pixel[2] *= inv;
        }
        Ok(pixels)
    }

    /// Averaged, gamma-corrected, 8-bit RGBA with opaque alpha.
    pub fn readback_rgba(&self) -> Result<Vec<u8>, GpuError> {
        let inv = 1.0 / self.current_sample.max(1) as f32;
        let accumulation = self.read_accumulation()?;

        let mut out = Vec::with_capacity(accumulation.len() * 4);
        for pixel in &accumulation {
            for channel in 0..3 {
                let averaged = pixel[channel] * inv;
                let gamma = if averaged > 0.0 { averaged.sqrt() } else { 0.0 };
                out.push((clamp(gamma, 0.0, 1.0) * 255.0) as u8);
            }
            out.push(255_u8);
        }
        Ok(out)
    }

    /// `(accumulated, total)` samples, for progress reporting.
    pub fn samples(&self) -> (u32, u32) {
        (self.current_sample, self.total_samples)
    }
}
