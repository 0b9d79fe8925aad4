use super::device::GpuDevice;
use crate::error::GpuError;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
const BYTES_PER_PIXEL: u32 = 4;
const FENCE_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Row layout of a readback buffer. wgpu requires every copied row to start
/// on a `COPY_BYTES_PER_ROW_ALIGNMENT` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDimensions {
    pub width: u32,
    pub height: u32,
    pub unpadded_bytes_per_row: u32,
    pub padded_bytes_per_row: u32,
}

impl BufferDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        let unpadded_bytes_per_row = width * BYTES_PER_PIXEL;
        let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(alignment) * alignment;
        Self {
            width,
            height,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        }
    }

    pub fn buffer_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.height as u64
    }

    pub fn unpadded_size(&self) -> usize {
        self.unpadded_bytes_per_row as usize * self.height as usize
    }
}

/// Copy the rows of a padded readback into a tightly packed `dst`.
pub fn strip_row_padding(data: &[u8], dims: BufferDimensions, dst: &mut [u8]) -> Result<(), GpuError> {
    let expected = dims.unpadded_size();
    if dst.len() != expected {
        return Err(GpuError::ReadbackSize {
            expected,
            actual: dst.len(),
        });
    }
    let padded_size = dims.buffer_size() as usize;
    if data.len() < padded_size {
        return Err(GpuError::ReadbackSize {
            expected: padded_size,
            actual: data.len(),
        });
    }
    if expected == 0 {
        return Ok(());
    }

    let row = dims.unpadded_bytes_per_row as usize;
    for (src, dst) in data
        .chunks(dims.padded_bytes_per_row as usize)
        .zip(dst.chunks_mut(row))
    {
        dst.copy_from_slice(&src[..row]);
    }
    Ok(())
}

/// Block until the map callback behind `fence` reports, the device is lost
/// or `timeout` elapses. `poll` drives the device between checks.
pub fn wait_on(
    fence: &Receiver<Result<(), wgpu::BufferAsyncError>>,
    timeout: Duration,
    lost: impl Fn() -> Option<String>,
    mut poll: impl FnMut(),
) -> Result<(), GpuError> {
    let started = Instant::now();
    loop {
        match fence.try_recv() {
            Ok(result) => return result.map_err(|err| GpuError::Map(err.to_string())),
            Err(TryRecvError::Disconnected) => {
                return Err(GpuError::Map("map callback dropped".to_string()));
            }
            Err(TryRecvError::Empty) => {}
        }
        if let Some(reason) = lost() {
            return Err(GpuError::DeviceLost(reason));
        }
        if started.elapsed() >= timeout {
            return Err(GpuError::FenceTimeout(timeout));
        }
        poll();
        std::thread::sleep(FENCE_POLL_INTERVAL);
    }
}

pub struct WgpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

pub struct WgpuTransferBuffer {
    buffer: wgpu::Buffer,
    dims: BufferDimensions,
}

/// A headless wgpu device. Fields drop in declaration order, so the device
/// goes before the adapter and instance it came from.
pub struct WgpuDevice {
    queue: wgpu::Queue,
    device: wgpu::Device,
    adapter: wgpu::Adapter,
    #[allow(dead_code)]
    instance: wgpu::Instance,
    lost: Arc<Mutex<Option<String>>>,
}

impl WgpuDevice {
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter_options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        };
        let adapter = match pollster::block_on(instance.request_adapter(&adapter_options)) {
            Ok(adapter) => adapter,
            Err(err) => {
                log::warn!("Adapter request failed ({err}), retrying with the fallback adapter");
                let fallback_options = wgpu::RequestAdapterOptions {
                    force_fallback_adapter: true,
                    ..adapter_options
                };
                pollster::block_on(instance.request_adapter(&fallback_options)).map_err(
                    |fallback_err| {
                        GpuError::AdapterUnavailable(format!(
                            "{err}; fallback failed: {fallback_err}"
                        ))
                    },
                )?
            }
        };

        let info = adapter.get_info();
        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("tracelens_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) = pollster::block_on(adapter.request_device(&device_desc))
            .map_err(|err| GpuError::DeviceCreation(err.to_string()))?;

        let lost = Arc::new(Mutex::new(None));
        {
            let lost = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                if matches!(reason, wgpu::DeviceLostReason::Destroyed) {
                    log::debug!("GPU device destroyed");
                    return;
                }
                log::error!("GPU device lost ({reason:?}): {message}");
                if let Ok(mut lost) = lost.lock() {
                    *lost = Some(message);
                }
            });
        }

        Ok(Self {
            queue,
            device,
            adapter,
            instance,
            lost,
        })
    }

    pub fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }

    /// Run `create` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

impl GpuDevice for WgpuDevice {
    type Texture = WgpuTarget;
    type Commands = wgpu::CommandEncoder;
    type TransferBuffer = WgpuTransferBuffer;
    type Fence = Receiver<Result<(), wgpu::BufferAsyncError>>;

    fn lost_reason(&self) -> Option<String> {
        self.lost.lock().ok().and_then(|lost| lost.clone())
    }

    fn create_target_texture(&self, width: u32, height: u32) -> Result<WgpuTarget, GpuError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(GpuError::TextureTooLarge {
                width,
                height,
                limit,
            });
        }
        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("tracelens_target"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TARGET_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[TARGET_FORMAT],
                })
            })
            .map_err(GpuError::TextureCreation)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget {
            texture,
            view,
            width,
            height,
        })
    }

    fn acquire_commands(&self) -> Option<wgpu::CommandEncoder> {
        if self.lost_reason().is_some() {
            return None;
        }
        Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tracelens_frame_encoder"),
                }),
        )
    }

    fn encode_clear(&self, commands: &mut wgpu::CommandEncoder, texture: &WgpuTarget, color: [f64; 4]) {
        let [r, g, b, a] = color;
        let _pass = commands.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tracelens_base_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &texture.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn create_transfer_buffer(&self, width: u32, height: u32) -> Result<WgpuTransferBuffer, GpuError> {
        let dims = BufferDimensions::new(width, height);
        let buffer = self
            .scoped(|device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("tracelens_readback"),
                    size: dims.buffer_size(),
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .map_err(GpuError::TransferBufferCreation)?;
        Ok(WgpuTransferBuffer { buffer, dims })
    }

    fn encode_download(
        &self,
        commands: &mut wgpu::CommandEncoder,
        texture: &WgpuTarget,
        buffer: &WgpuTransferBuffer,
    ) {
        commands.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(buffer.dims.padded_bytes_per_row),
                    rows_per_image: Some(buffer.dims.height),
                },
            },
            wgpu::Extent3d {
                width: texture.width.min(buffer.dims.width),
                height: texture.height.min(buffer.dims.height),
                depth_or_array_layers: 1,
            },
        );
    }

    fn submit(&self, commands: wgpu::CommandEncoder, buffer: &WgpuTransferBuffer) -> Self::Fence {
        self.queue.submit(Some(commands.finish()));
        let (sender, receiver) = mpsc::channel();
        buffer
            .buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        receiver
    }

    fn wait(&self, fence: Self::Fence, timeout: Duration) -> Result<(), GpuError> {
        wait_on(
            &fence,
            timeout,
            || self.lost_reason(),
            || {
                let _ = self.device.poll(wgpu::PollType::Poll);
            },
        )
    }

    fn read_transfer_buffer(&self, buffer: &WgpuTransferBuffer, dst: &mut [u8]) -> Result<(), GpuError> {
        let result = {
            let data = buffer.buffer.slice(..).get_mapped_range();
            strip_row_padding(&data, buffer.dims, dst)
        };
        buffer.buffer.unmap();
        result
    }

    fn release_transfer_buffer(&self, buffer: WgpuTransferBuffer) {
        buffer.buffer.destroy();
    }

    fn release_texture(&self, texture: WgpuTarget) {
        drop(texture.view);
        texture.texture.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_padded_to_copy_alignment() {
        let dims = BufferDimensions::new(10, 3);
        assert_eq!(dims.unpadded_bytes_per_row, 40);
        assert_eq!(dims.padded_bytes_per_row, 256);
        assert_eq!(dims.buffer_size(), 768);

        let exact = BufferDimensions::new(64, 2);
        assert_eq!(exact.padded_bytes_per_row, 256);
        assert_eq!(exact.unpadded_size(), 512);
    }

    #[test]
    fn test_strip_row_padding() {
        let dims = BufferDimensions::new(2, 2);
        let mut data = vec![0xEEu8; dims.buffer_size() as usize];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[256..264].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let mut dst = vec![0u8; dims.unpadded_size()];
        strip_row_padding(&data, dims, &mut dst).unwrap();
        assert_eq!(dst, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_strip_row_padding_rejects_wrong_sizes() {
        let dims = BufferDimensions::new(2, 2);
        let data = vec![0u8; dims.buffer_size() as usize];
        let mut short = vec![0u8; 4];
        assert_eq!(
            strip_row_padding(&data, dims, &mut short),
            Err(GpuError::ReadbackSize {
                expected: 16,
                actual: 4
            })
        );

        let mut dst = vec![0u8; 16];
        assert!(matches!(
            strip_row_padding(&data[..100], dims, &mut dst),
            Err(GpuError::ReadbackSize { .. })
        ));
    }

    #[test]
    fn test_wait_on_signalled_fence() {
        let (sender, fence) = mpsc::channel();
        sender.send(Ok(())).unwrap();
        let mut polls = 0;
        let result = wait_on(&fence, Duration::from_secs(5), || None, || polls += 1);
        assert_eq!(result, Ok(()));
        assert_eq!(polls, 0);
    }

    #[test]
    fn test_wait_on_stalled_fence_times_out() {
        let (_sender, fence) = mpsc::channel();
        let timeout = Duration::from_millis(20);
        let started = Instant::now();
        let mut polls = 0;
        let result = wait_on(&fence, timeout, || None, || polls += 1);
        assert_eq!(result, Err(GpuError::FenceTimeout(timeout)));
        assert!(started.elapsed() >= timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(polls > 0);
    }

    #[test]
    fn test_wait_on_dropped_callback() {
        let (sender, fence) = mpsc::channel();
        drop(sender);
        let result = wait_on(&fence, Duration::from_secs(5), || None, || {});
        assert!(matches!(result, Err(GpuError::Map(_))));
    }

    #[test]
    fn test_wait_on_lost_device() {
        let (_sender, fence) = mpsc::channel();
        let result = wait_on(
            &fence,
            Duration::from_secs(5),
            || Some("driver reset".to_string()),
            || {},
        );
        assert_eq!(result, Err(GpuError::DeviceLost("driver reset".to_string())));
    }
}
