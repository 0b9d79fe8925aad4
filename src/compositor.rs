//! Per-frame GPU base layer: clear a target texture, download it to the host
//! and hand the pixels to the presentation surface.
//!
//! Compositing is best effort. Transient failures skip the frame and the
//! next tick tries again; a device-level failure is returned once and every
//! later frame is skipped.

use crate::error::GpuError;
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod device;
pub mod wgpu_device;

pub use device::GpuDevice;
pub use wgpu_device::WgpuDevice;

pub const CLEAR_COLOR: [f64; 4] = [0.05, 0.05, 0.15, 1.0];
pub const BYTES_PER_PIXEL: usize = 4;

/// Coalescing "please redraw" flag. Any number of requests before the next
/// `take` collapse into one frame.
#[derive(Debug, Clone)]
pub struct Invalidation(Arc<AtomicBool>);

impl Invalidation {
    /// Starts out requested so the first tick draws a frame.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether a frame was requested.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for Invalidation {
    fn default() -> Self {
        Self::new()
    }
}

/// Host-side copy of the base layer, BGRA8, rows tightly packed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// Returns `true` if the size changed. Contents are cleared on change.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == self.width && height == self.height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// The pixels reordered to RGBA for presentation.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = self.pixels.clone();
        for pixel in rgba.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
        rgba
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A composite was already in flight.
    Busy,
    EmptySurface,
    NoCommandContext,
    Texture,
    TransferBuffer,
    Readback,
    /// The device failed earlier and is no longer used.
    DeviceLost,
}

impl From<&GpuError> for SkipReason {
    fn from(err: &GpuError) -> Self {
        match err {
            GpuError::CommandContextUnavailable => SkipReason::NoCommandContext,
            GpuError::TextureTooLarge { .. } | GpuError::TextureCreation(_) => SkipReason::Texture,
            GpuError::TransferBufferCreation(_) => SkipReason::TransferBuffer,
            GpuError::Map(_) | GpuError::ReadbackSize { .. } => SkipReason::Readback,
            GpuError::AdapterUnavailable(_)
            | GpuError::DeviceCreation(_)
            | GpuError::FenceTimeout(_)
            | GpuError::DeviceLost(_) => SkipReason::DeviceLost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    Skipped(SkipReason),
}

struct Target<T> {
    texture: T,
    width: u32,
    height: u32,
}

/// Clears the busy flag when a composite ends, however it ends.
struct BusyGuard<'a>(&'a Cell<bool>);

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Drives one [`GpuDevice`] through the per-frame render and readback
/// sequence. At most one composite runs at a time; a second request made
/// while one is in flight is dropped.
pub struct FrameCompositor<D: GpuDevice> {
    target: RefCell<Option<Target<D::Texture>>>,
    device: D,
    fence_timeout: Duration,
    busy: Cell<bool>,
    failed: Cell<bool>,
}

impl<D: GpuDevice> FrameCompositor<D> {
    pub fn new(device: D, fence_timeout: Duration) -> Self {
        Self {
            target: RefCell::new(None),
            device,
            fence_timeout,
            busy: Cell::new(false),
            failed: Cell::new(false),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Whether a device-level error has already been reported.
    pub fn has_failed(&self) -> bool {
        self.failed.get()
    }

    /// Render the base layer at the size of `framebuffer` and read it back
    /// into it.
    pub fn composite(&self, framebuffer: &mut Framebuffer) -> Result<FrameStatus, GpuError> {
        if self.failed.get() {
            return Ok(FrameStatus::Skipped(SkipReason::DeviceLost));
        }
        let Some(_busy) = BusyGuard::enter(&self.busy) else {
            log::trace!("Composite already in flight, dropping request");
            return Ok(FrameStatus::Skipped(SkipReason::Busy));
        };
        if framebuffer.is_empty() {
            return Ok(FrameStatus::Skipped(SkipReason::EmptySurface));
        }

        match self.render(framebuffer) {
            Ok(()) => Ok(FrameStatus::Presented),
            Err(err) if err.is_fatal() => {
                self.failed.set(true);
                log::error!("Frame compositing stopped: {err}");
                Err(err)
            }
            Err(err) => {
                log::debug!("Skipping frame: {err}");
                Ok(FrameStatus::Skipped(SkipReason::from(&err)))
            }
        }
    }

    fn render(&self, framebuffer: &mut Framebuffer) -> Result<(), GpuError> {
        if let Some(reason) = self.device.lost_reason() {
            return Err(GpuError::DeviceLost(reason));
        }
        let mut commands = self
            .device
            .acquire_commands()
            .ok_or(GpuError::CommandContextUnavailable)?;

        let (width, height) = (framebuffer.width(), framebuffer.height());
        let mut slot = self.target.borrow_mut();
        let target = match slot.take() {
            Some(target) if target.width == width && target.height == height => slot.insert(target),
            stale => {
                if let Some(old) = stale {
                    log::debug!(
                        "Releasing {}x{} target texture before resizing to {width}x{height}",
                        old.width,
                        old.height
                    );
                    self.device.release_texture(old.texture);
                }
                let texture = self.device.create_target_texture(width, height)?;
                slot.insert(Target {
                    texture,
                    width,
                    height,
                })
            }
        };
        self.device.encode_clear(&mut commands, &target.texture, CLEAR_COLOR);

        let buffer = self.device.create_transfer_buffer(width, height)?;
        let result = self.download(commands, &target.texture, &buffer, framebuffer);
        self.device.release_transfer_buffer(buffer);
        result
    }

    fn download(
        &self,
        mut commands: D::Commands,
        texture: &D::Texture,
        buffer: &D::TransferBuffer,
        framebuffer: &mut Framebuffer,
    ) -> Result<(), GpuError> {
        self.device.encode_download(&mut commands, texture, buffer);
        let fence = self.device.submit(commands, buffer);
        self.device.wait(fence, self.fence_timeout)?;
        self.device.read_transfer_buffer(buffer, framebuffer.bytes_mut())
    }
}

impl<D: GpuDevice> Drop for FrameCompositor<D> {
    fn drop(&mut self) {
        if let Some(target) = self.target.get_mut().take() {
            self.device.release_texture(target.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::rc::{Rc, Weak};

    #[derive(Default)]
    struct Script {
        fail_acquire: bool,
        fail_texture: bool,
        fail_transfer: bool,
        fail_read: bool,
        stall: bool,
        lost: Option<String>,
        fill: u8,
    }

    #[derive(Default)]
    struct Shared {
        log: RefCell<Vec<String>>,
        live: RefCell<BTreeSet<String>>,
        script: RefCell<Script>,
        next_id: Cell<u32>,
        on_wait: RefCell<Option<Box<dyn Fn()>>>,
    }

    impl Shared {
        fn record(&self, event: String) {
            self.log.borrow_mut().push(event);
        }

        fn allocate(&self, kind: &str) -> u32 {
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            self.live.borrow_mut().insert(format!("{kind} {id}"));
            id
        }

        fn free(&self, kind: &str, id: u32) {
            assert!(
                self.live.borrow_mut().remove(&format!("{kind} {id}")),
                "{kind} {id} released twice"
            );
        }

        fn events(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    struct MockDevice(Rc<Shared>);

    struct MockTexture(u32);

    impl GpuDevice for MockDevice {
        type Texture = MockTexture;
        type Commands = ();
        type TransferBuffer = u32;
        type Fence = u32;

        fn lost_reason(&self) -> Option<String> {
            self.0.script.borrow().lost.clone()
        }

        fn create_target_texture(&self, width: u32, height: u32) -> Result<MockTexture, GpuError> {
            if self.0.script.borrow().fail_texture {
                self.0.record("create_texture failed".to_string());
                return Err(GpuError::TextureCreation("out of memory".to_string()));
            }
            let id = self.0.allocate("texture");
            self.0.record(format!("create_texture {id} {width}x{height}"));
            Ok(MockTexture(id))
        }

        fn acquire_commands(&self) -> Option<()> {
            self.0.record("acquire".to_string());
            (!self.0.script.borrow().fail_acquire).then_some(())
        }

        fn encode_clear(&self, _commands: &mut (), texture: &MockTexture, color: [f64; 4]) {
            assert_eq!(color, CLEAR_COLOR);
            self.0.record(format!("clear {}", texture.0));
        }

        fn create_transfer_buffer(&self, _width: u32, _height: u32) -> Result<u32, GpuError> {
            if self.0.script.borrow().fail_transfer {
                return Err(GpuError::TransferBufferCreation("no host memory".to_string()));
            }
            let id = self.0.allocate("buffer");
            self.0.record(format!("create_buffer {id}"));
            Ok(id)
        }

        fn encode_download(&self, _commands: &mut (), texture: &MockTexture, buffer: &u32) {
            self.0.record(format!("download {}->{buffer}", texture.0));
        }

        fn submit(&self, _commands: (), buffer: &u32) -> u32 {
            self.0.record(format!("submit {buffer}"));
            *buffer
        }

        fn wait(&self, _fence: u32, timeout: Duration) -> Result<(), GpuError> {
            self.0.record("wait".to_string());
            if let Some(hook) = self.0.on_wait.borrow().as_ref() {
                hook();
            }
            if self.0.script.borrow().stall {
                return Err(GpuError::FenceTimeout(timeout));
            }
            Ok(())
        }

        fn read_transfer_buffer(&self, buffer: &u32, dst: &mut [u8]) -> Result<(), GpuError> {
            self.0.record(format!("read {buffer}"));
            let script = self.0.script.borrow();
            if script.fail_read {
                return Err(GpuError::Map("validation error".to_string()));
            }
            dst.fill(script.fill);
            Ok(())
        }

        fn release_transfer_buffer(&self, buffer: u32) {
            self.0.free("buffer", buffer);
            self.0.record(format!("release_buffer {buffer}"));
        }

        fn release_texture(&self, texture: MockTexture) {
            self.0.free("texture", texture.0);
            self.0.record(format!("release_texture {}", texture.0));
        }
    }

    impl Drop for MockDevice {
        fn drop(&mut self) {
            self.0.record("destroy_device".to_string());
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(2000);

    fn compositor() -> (FrameCompositor<MockDevice>, Rc<Shared>) {
        let shared = Rc::new(Shared::default());
        let compositor = FrameCompositor::new(MockDevice(Rc::clone(&shared)), TIMEOUT);
        (compositor, shared)
    }

    fn events(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_frame_follows_submit_wait_read_order() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().fill = 0x7F;
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(compositor.composite(&mut framebuffer), Ok(FrameStatus::Presented));
        assert_eq!(
            shared.events(),
            events(&[
                "acquire",
                "create_texture 1 4x2",
                "clear 1",
                "create_buffer 2",
                "download 1->2",
                "submit 2",
                "wait",
                "read 2",
                "release_buffer 2",
            ])
        );
        assert!(framebuffer.bytes().iter().all(|&b| b == 0x7F));
        assert_eq!(*shared.live.borrow(), BTreeSet::from(["texture 1".to_string()]));
        assert!(!compositor.is_busy());
    }

    #[test]
    fn test_texture_is_reused_while_size_is_unchanged() {
        let (compositor, shared) = compositor();
        let mut framebuffer = Framebuffer::new(4, 2);
        compositor.composite(&mut framebuffer).unwrap();
        shared.log.borrow_mut().clear();

        assert_eq!(compositor.composite(&mut framebuffer), Ok(FrameStatus::Presented));
        let log = shared.events();
        assert!(!log.iter().any(|e| e.starts_with("create_texture")));
        assert!(log.contains(&"clear 1".to_string()));
        assert!(log.contains(&"release_buffer 3".to_string()));
    }

    #[test]
    fn test_resize_releases_old_texture_first() {
        let (compositor, shared) = compositor();
        let mut framebuffer = Framebuffer::new(4, 2);
        compositor.composite(&mut framebuffer).unwrap();
        assert!(framebuffer.resize(8, 4));
        shared.log.borrow_mut().clear();

        compositor.composite(&mut framebuffer).unwrap();
        let log = shared.events();
        assert_eq!(&log[..3], &events(&["acquire", "release_texture 1", "create_texture 3 8x4"])[..]);
        assert_eq!(*shared.live.borrow(), BTreeSet::from(["texture 3".to_string()]));
    }

    #[test]
    fn test_missing_command_context_skips_frame() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().fail_acquire = true;
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::NoCommandContext))
        );
        assert_eq!(shared.events(), events(&["acquire"]));
        assert!(shared.live.borrow().is_empty());

        // The next tick recovers.
        shared.script.borrow_mut().fail_acquire = false;
        assert_eq!(compositor.composite(&mut framebuffer), Ok(FrameStatus::Presented));
    }

    #[test]
    fn test_texture_failure_skips_before_any_transfer() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().fail_texture = true;
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::Texture))
        );
        assert_eq!(shared.events(), events(&["acquire", "create_texture failed"]));
        assert!(!compositor.has_failed());
    }

    #[test]
    fn test_transfer_buffer_failure_skips_frame() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().fail_transfer = true;
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::TransferBuffer))
        );
        assert!(!shared.events().iter().any(|e| e.starts_with("submit")));
    }

    #[test]
    fn test_transfer_buffer_released_when_read_fails() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().fail_read = true;
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::Readback))
        );
        let log = shared.events();
        assert_eq!(&log[log.len() - 2..], &events(&["read 2", "release_buffer 2"])[..]);
        assert_eq!(*shared.live.borrow(), BTreeSet::from(["texture 1".to_string()]));
    }

    #[test]
    fn test_reentrant_composite_is_dropped() {
        let shared = Rc::new(Shared::default());
        let compositor = Rc::new(FrameCompositor::new(MockDevice(Rc::clone(&shared)), TIMEOUT));
        let inner_status = Rc::new(RefCell::new(None));
        {
            let weak: Weak<FrameCompositor<MockDevice>> = Rc::downgrade(&compositor);
            let inner_status = Rc::clone(&inner_status);
            *shared.on_wait.borrow_mut() = Some(Box::new(move || {
                if let Some(compositor) = weak.upgrade() {
                    assert!(compositor.is_busy());
                    let mut other = Framebuffer::new(4, 2);
                    *inner_status.borrow_mut() = Some(compositor.composite(&mut other));
                }
            }));
        }

        let mut framebuffer = Framebuffer::new(4, 2);
        assert_eq!(compositor.composite(&mut framebuffer), Ok(FrameStatus::Presented));
        assert_eq!(
            *inner_status.borrow(),
            Some(Ok(FrameStatus::Skipped(SkipReason::Busy)))
        );
        let log = shared.events();
        assert_eq!(log.iter().filter(|e| e.starts_with("submit")).count(), 1);
        assert_eq!(log.iter().filter(|e| e.starts_with("release_buffer")).count(), 1);
        assert!(!compositor.is_busy());
    }

    #[test]
    fn test_fence_timeout_is_reported_once() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().stall = true;
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(
            compositor.composite(&mut framebuffer),
            Err(GpuError::FenceTimeout(TIMEOUT))
        );
        // The transfer buffer is still released after the stall.
        assert!(shared.events().contains(&"release_buffer 2".to_string()));
        assert!(compositor.has_failed());

        shared.log.borrow_mut().clear();
        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::DeviceLost))
        );
        assert!(shared.events().is_empty());
    }

    #[test]
    fn test_device_loss_is_fatal() {
        let (compositor, shared) = compositor();
        shared.script.borrow_mut().lost = Some("driver reset".to_string());
        let mut framebuffer = Framebuffer::new(4, 2);

        assert_eq!(
            compositor.composite(&mut framebuffer),
            Err(GpuError::DeviceLost("driver reset".to_string()))
        );
        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::DeviceLost))
        );
        assert!(shared.events().is_empty());
    }

    #[test]
    fn test_empty_surface_is_skipped() {
        let (compositor, shared) = compositor();
        let mut framebuffer = Framebuffer::new(0, 600);
        assert_eq!(
            compositor.composite(&mut framebuffer),
            Ok(FrameStatus::Skipped(SkipReason::EmptySurface))
        );
        assert!(shared.events().is_empty());
    }

    #[test]
    fn test_drop_releases_texture_before_device() {
        let (compositor, shared) = compositor();
        let mut framebuffer = Framebuffer::new(4, 2);
        compositor.composite(&mut framebuffer).unwrap();
        shared.log.borrow_mut().clear();

        drop(compositor);
        assert_eq!(shared.events(), events(&["release_texture 1", "destroy_device"]));
        assert!(shared.live.borrow().is_empty());
    }

    #[test]
    fn test_invalidations_coalesce() {
        let invalidation = Invalidation::new();
        assert!(invalidation.take());
        assert!(!invalidation.take());

        let from_listener = invalidation.clone();
        from_listener.request();
        from_listener.request();
        invalidation.request();
        assert!(invalidation.is_requested());
        assert!(invalidation.take());
        assert!(!invalidation.take());
    }

    #[test]
    fn test_framebuffer_swizzles_to_rgba() {
        let mut framebuffer = Framebuffer::new(2, 1);
        framebuffer
            .bytes_mut()
            .copy_from_slice(&[0x10, 0x20, 0x30, 0xFF, 0x01, 0x02, 0x03, 0x80]);
        assert_eq!(
            framebuffer.to_rgba(),
            vec![0x30, 0x20, 0x10, 0xFF, 0x03, 0x02, 0x01, 0x80]
        );
        assert!(!framebuffer.resize(2, 1));
        assert!(framebuffer.resize(3, 1));
        assert_eq!(framebuffer.bytes().len(), 12);
    }
}
