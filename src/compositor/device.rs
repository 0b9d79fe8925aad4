use crate::error::GpuError;
use std::time::Duration;

/// The GPU operations the frame compositor drives.
///
/// Resources are handed out by value and handed back through the `release_*`
/// methods so the compositor controls the order in which they go away.
pub trait GpuDevice {
    type Texture;
    type Commands;
    type TransferBuffer;
    type Fence;

    /// `Some` once the device has been lost. A lost device never comes back.
    fn lost_reason(&self) -> Option<String>;

    fn create_target_texture(&self, width: u32, height: u32) -> Result<Self::Texture, GpuError>;

    /// A fresh command submission context, or `None` if the device cannot
    /// hand one out right now.
    fn acquire_commands(&self) -> Option<Self::Commands>;

    fn encode_clear(&self, commands: &mut Self::Commands, texture: &Self::Texture, color: [f64; 4]);

    /// Host-visible buffer large enough for a `width` x `height` readback.
    fn create_transfer_buffer(&self, width: u32, height: u32) -> Result<Self::TransferBuffer, GpuError>;

    fn encode_download(
        &self,
        commands: &mut Self::Commands,
        texture: &Self::Texture,
        buffer: &Self::TransferBuffer,
    );

    /// Submit `commands`; the returned fence signals once `buffer` may be read.
    fn submit(&self, commands: Self::Commands, buffer: &Self::TransferBuffer) -> Self::Fence;

    fn wait(&self, fence: Self::Fence, timeout: Duration) -> Result<(), GpuError>;

    /// Copy the tightly packed pixels of `buffer` into `dst`. The buffer is
    /// unmapped again whether or not the copy succeeds.
    fn read_transfer_buffer(&self, buffer: &Self::TransferBuffer, dst: &mut [u8]) -> Result<(), GpuError>;

    fn release_transfer_buffer(&self, buffer: Self::TransferBuffer);

    fn release_texture(&self, texture: Self::Texture);
}
