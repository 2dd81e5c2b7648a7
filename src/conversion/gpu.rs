// SPDX-License-Identifier: GPL-3.0-only

//! GPU conversion path
//!
//! Staged bytes are uploaded into a storage buffer and converted by one
//! compute dispatch into a temporary RGBA texture. A second dispatch rotates
//! that into the persistent output texture; at 0 degrees a texture copy is
//! used instead.

use super::layout::{stage_image, PlaneLayout};
use super::{ConversionOptions, Mirror, Rotation};
use crate::constants::{COPY_ROW_ALIGNMENT, WORKGROUP_SIZE};
use crate::errors::{Error, Result};
use crate::gpu::{compute_dispatch_size, read_buffer_async, wgpu, CachedDimensions, GpuContext};
use crate::media::{CameraImage, ImageFormat};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

const CONVERT_SHADER: &str = include_str!("shaders/convert.wgsl");
const ROTATE_SHADER: &str = include_str!("shaders/rotate.wgsl");

/// Convert kernel per source format
const CONVERT_KERNELS: [(ImageFormat, &str); 3] = [
    (ImageFormat::YCbCr420, "convert_yuv420"),
    (ImageFormat::RGBA8888, "convert_rgba8888"),
    (ImageFormat::BGRA8888, "convert_bgra8888"),
];

/// Rotate kernel per rotation; `Rotation::None` is a texture copy
const ROTATE_KERNELS: [(Rotation, &str); 3] = [
    (Rotation::Rotate90, "rotate_90"),
    (Rotation::Rotate180, "rotate_180"),
    (Rotation::Rotate270, "rotate_270"),
];

/// Conversion parameters uniform (must match shader struct)
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ConvertParams {
    width: u32,
    height: u32,
    mirror: u32,
    _pad: u32,
    offsets: [u32; 4],
    strides: [u32; 4],
}

impl ConvertParams {
    fn new(layout: &PlaneLayout, mirror: Mirror) -> Self {
        Self {
            width: layout.width,
            height: layout.height,
            mirror: mirror.gpu_code(),
            _pad: 0,
            offsets: layout.offsets,
            strides: layout.strides,
        }
    }
}

fn kernel_for_format(format: ImageFormat) -> Option<&'static str> {
    CONVERT_KERNELS
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, name)| *name)
}

fn kernel_for_rotation(rotation: Rotation) -> Option<&'static str> {
    ROTATE_KERNELS
        .iter()
        .find(|(r, _)| *r == rotation)
        .map(|(_, name)| *name)
}

fn rgba_texture(device: &wgpu::Device, label: &str, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba8Unorm,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Converts camera images into a persistent RGBA texture
pub struct GpuConverter {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    convert_layout: wgpu::BindGroupLayout,
    rotate_layout: wgpu::BindGroupLayout,
    convert_pipelines: Vec<(ImageFormat, wgpu::ComputePipeline)>,
    rotate_pipelines: Vec<(Rotation, wgpu::ComputePipeline)>,
    uniform_buffer: wgpu::Buffer,
    // Cached resources, reallocated when sizes change
    staged_buffer: Option<wgpu::Buffer>,
    staged_capacity: u64,
    temp_texture: Option<wgpu::Texture>,
    temp_dims: CachedDimensions,
    output_texture: Option<wgpu::Texture>,
    output_dims: CachedDimensions,
    scratch: Vec<u8>,
}

impl GpuConverter {
    pub fn new(context: &GpuContext) -> Self {
        info!("Initializing GPU conversion pipelines");
        let device = Arc::clone(context.device());

        let convert_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("convert_shader"),
            source: wgpu::ShaderSource::Wgsl(CONVERT_SHADER.into()),
        });
        let rotate_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("rotate_shader"),
            source: wgpu::ShaderSource::Wgsl(ROTATE_SHADER.into()),
        });

        // Bindings: staged bytes, params, output
        let convert_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("convert_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_texture_entry(2),
            ],
        });

        // Bindings: source texture, output
        let rotate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("rotate_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                storage_texture_entry(1),
            ],
        });

        let convert_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("convert_pipeline_layout"),
            bind_group_layouts: &[&convert_layout],
            push_constant_ranges: &[],
        });
        let rotate_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("rotate_pipeline_layout"),
            bind_group_layouts: &[&rotate_layout],
            push_constant_ranges: &[],
        });

        let convert_pipelines = CONVERT_KERNELS
            .iter()
            .map(|&(format, entry)| {
                (format, compute_pipeline(&device, &convert_pipeline_layout, &convert_module, entry))
            })
            .collect();
        let rotate_pipelines = ROTATE_KERNELS
            .iter()
            .map(|&(rotation, entry)| {
                (rotation, compute_pipeline(&device, &rotate_pipeline_layout, &rotate_module, entry))
            })
            .collect();

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("convert_uniform_buffer"),
            size: std::mem::size_of::<ConvertParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue: Arc::clone(context.queue()),
            convert_layout,
            rotate_layout,
            convert_pipelines,
            rotate_pipelines,
            uniform_buffer,
            staged_buffer: None,
            staged_capacity: 0,
            temp_texture: None,
            temp_dims: CachedDimensions::default(),
            output_texture: None,
            output_dims: CachedDimensions::default(),
            scratch: Vec::new(),
        }
    }

    /// Stage and convert `image`; returns the output width and height
    pub fn convert(&mut self, image: &CameraImage<'_>, options: ConversionOptions) -> Result<(u32, u32)> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = stage_image(image, &mut scratch)
            .and_then(|layout| self.convert_staged(&layout, &scratch, options));
        self.scratch = scratch;
        result
    }

    /// Convert bytes already staged by [`stage_image`]
    pub fn convert_staged(
        &mut self,
        layout: &PlaneLayout,
        staged: &[u8],
        options: ConversionOptions,
    ) -> Result<(u32, u32)> {
        let start = std::time::Instant::now();
        if kernel_for_format(layout.format).is_none() {
            return Err(Error::UnknownFormat(layout.format as i32));
        }

        let (width, height) = (layout.width, layout.height);
        let rotation = options.rotation();
        let (out_width, out_height) = rotation.output_size(width, height);

        // Storage buffers are read as u32 words and written in 4-byte units
        let staged: Cow<'_, [u8]> = if staged.len() % 4 == 0 {
            Cow::Borrowed(staged)
        } else {
            let mut padded = staged.to_vec();
            padded.resize(staged.len().div_ceil(4) * 4, 0);
            Cow::Owned(padded)
        };

        self.ensure_staged_buffer(staged.len() as u64);
        if self.temp_dims.needs_update(width, height) || self.temp_texture.is_none() {
            self.temp_texture = Some(rgba_texture(&self.device, "convert_temp_rgba", width, height));
            self.temp_dims.update(width, height);
        }
        if self.output_dims.needs_update(out_width, out_height) || self.output_texture.is_none() {
            debug!(out_width, out_height, "Reallocating output texture");
            self.output_texture = Some(rgba_texture(&self.device, "convert_output_rgba", out_width, out_height));
            self.output_dims.update(out_width, out_height);
        }

        let convert_pipeline = self
            .convert_pipelines
            .iter()
            .find(|(format, _)| *format == layout.format)
            .map(|(_, pipeline)| pipeline);
        let (Some(convert_pipeline), Some(staged_buffer), Some(temp), Some(output)) = (
            convert_pipeline,
            &self.staged_buffer,
            &self.temp_texture,
            &self.output_texture,
        ) else {
            return Err(Error::Gpu("conversion resources not allocated".into()));
        };

        self.queue.write_buffer(staged_buffer, 0, &staged);
        let params = ConvertParams::new(layout, options.mirror);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let temp_view = temp.create_view(&wgpu::TextureViewDescriptor::default());
        let convert_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("convert_bind_group"),
            layout: &self.convert_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: staged_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(staged.len() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&temp_view),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("convert_encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("convert_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(convert_pipeline);
            pass.set_bind_group(0, Some(&convert_bind_group), &[]);
            pass.dispatch_workgroups(
                compute_dispatch_size(width, WORKGROUP_SIZE),
                compute_dispatch_size(height, WORKGROUP_SIZE),
                1,
            );
        }

        match self
            .rotate_pipelines
            .iter()
            .find(|(r, _)| *r == rotation)
        {
            Some((_, rotate_pipeline)) => {
                let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
                let rotate_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("rotate_bind_group"),
                    layout: &self.rotate_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&temp_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&output_view),
                        },
                    ],
                });
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("rotate_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(rotate_pipeline);
                pass.set_bind_group(0, Some(&rotate_bind_group), &[]);
                pass.dispatch_workgroups(
                    compute_dispatch_size(out_width, WORKGROUP_SIZE),
                    compute_dispatch_size(out_height, WORKGROUP_SIZE),
                    1,
                );
            }
            None => encoder.copy_texture_to_texture(
                temp.as_image_copy(),
                output.as_image_copy(),
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            ),
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 2 {
            debug!(
                elapsed_ms = format!("{:.2}", elapsed.as_micros() as f64 / 1000.0),
                width,
                height,
                convert = kernel_for_format(layout.format).unwrap_or_default(),
                rotate = kernel_for_rotation(rotation).unwrap_or("copy"),
                "GPU conversion"
            );
        }

        Ok((out_width, out_height))
    }

    fn ensure_staged_buffer(&mut self, len: u64) {
        let needed = len.div_ceil(4).max(1) * 4;
        if self.staged_buffer.is_some() && self.staged_capacity >= needed {
            return;
        }
        self.staged_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("convert_staged_buffer"),
            size: needed,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.staged_capacity = needed;
    }

    /// The converted texture; valid until the next conversion changes its size
    pub fn output_texture(&self) -> Option<&wgpu::Texture> {
        self.output_texture.as_ref()
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_dims.width, self.output_dims.height)
    }

    /// Read the output texture back as tightly packed RGBA
    pub async fn read_rgba_async(&self) -> Result<Vec<u8>> {
        let output = self
            .output_texture
            .as_ref()
            .ok_or_else(|| Error::Gpu("Output texture not allocated".into()))?;
        let (width, height) = self.output_size();
        let row_bytes = width * 4;
        let padded_bytes_per_row = row_bytes.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("convert_readback"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("convert_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            output.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = read_buffer_async(&self.device, &staging_buffer).await?;
        if padded_bytes_per_row == row_bytes {
            return Ok(data);
        }
        // Remove row padding
        let mut rgba = Vec::with_capacity((row_bytes * height) as usize);
        for row in data.chunks_exact(padded_bytes_per_row as usize) {
            rgba.extend_from_slice(&row[..row_bytes as usize]);
        }
        Ok(rgba)
    }

    /// [`GpuConverter::read_rgba_async`] for synchronous callers
    pub fn read_rgba(&self) -> Result<Vec<u8>> {
        pollster::block_on(self.read_rgba_async())
    }
}

impl std::fmt::Debug for GpuConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuConverter")
            .field("output_dims", &self.output_dims)
            .field("staged_capacity", &self.staged_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::cpu::CpuConverter;
    use crate::conversion::Orientation;
    use crate::media::Plane;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) -> naga::Module {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(e) => panic!("Shader '{}' parse failed: {:?}", name, e),
        };
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module);
        if let Err(e) = info {
            panic!("Shader '{}' validation failed: {:?}", name, e);
        }
        module
    }

    fn entry_points(module: &naga::Module) -> Vec<&str> {
        module.entry_points.iter().map(|ep| ep.name.as_str()).collect()
    }

    #[test]
    fn test_convert_shader_validates() {
        let module = validate_shader("convert", CONVERT_SHADER);
        let entries = entry_points(&module);
        for (_, kernel) in CONVERT_KERNELS {
            assert!(entries.contains(&kernel), "missing {kernel}");
        }
    }

    #[test]
    fn test_rotate_shader_validates() {
        let module = validate_shader("rotate", ROTATE_SHADER);
        let entries = entry_points(&module);
        for (_, kernel) in ROTATE_KERNELS {
            assert!(entries.contains(&kernel), "missing {kernel}");
        }
    }

    #[test]
    fn test_kernel_tables() {
        assert_eq!(kernel_for_format(ImageFormat::YCbCr420), Some("convert_yuv420"));
        assert_eq!(kernel_for_format(ImageFormat::Unknown), None);
        assert_eq!(kernel_for_rotation(Rotation::Rotate270), Some("rotate_270"));
        assert_eq!(kernel_for_rotation(Rotation::None), None);
    }

    #[test]
    fn test_params_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<ConvertParams>(), 48);
    }

    #[test]
    fn test_gpu_matches_cpu() {
        let context = match GpuContext::blocking("conversion_test") {
            Ok(context) => context,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let (width, height) = (20u32, 12u32);
        let y: Vec<u8> = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        let uv: Vec<u8> = (0..width * height / 2).map(|i| (i * 13 % 256) as u8).collect();
        let planes = vec![
            Plane::new(&y, width, height, width, 1),
            Plane::new(&uv[..uv.len() - 1], width / 2, height / 2, width, 2),
            Plane::new(&uv[1..], width / 2, height / 2, width, 2),
        ];
        let image = CameraImage::planar(planes, width, height, 0).unwrap();
        let options = ConversionOptions::new(Orientation::Portrait, Mirror::Horizontal);

        let mut expected = vec![0u8; (width * height * 4) as usize];
        CpuConverter::new().convert(&image, options, &mut expected).unwrap();

        let mut converter = GpuConverter::new(&context);
        let size = converter.convert(&image, options).unwrap();
        assert_eq!(size, (height, width));
        let actual = converter.read_rgba().unwrap();

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            assert!(a.abs_diff(*e) <= 2, "gpu {a} vs cpu {e}");
        }
    }
}
