use crate::models::error::CaptureError;
use crate::models::stream::SourceInfo;

/// A producer of captured items (video frames or audio chunks).
///
/// Implemented by:
/// - `SyntheticScreenSource`, `SyntheticToneSource` (any platform)
/// - `WasapiLoopbackSource`, `WasapiMicSource`, `GdigrabScreenSource` (Windows)
///
/// A source is moved onto its capture thread and only ever touched from
/// there, so it must be `Send` but not `Sync`.
pub trait CaptureSource<T>: Send {
    /// Block until the next item is available.
    ///
    /// Returns `CaptureError::Device` (or `DeviceNotAvailable`) if the
    /// underlying device or display stops delivering. Video sources pace
    /// themselves to their target frame interval.
    fn next_item(&mut self) -> Result<T, CaptureError>;

    /// Information about the device behind this source.
    fn device_info(&self) -> SourceInfo;

    /// Release the underlying device. Called once by the capture loop on exit.
    fn close(&mut self) {}
}

impl<T, S: CaptureSource<T> + ?Sized> CaptureSource<T> for Box<S> {
    fn next_item(&mut self) -> Result<T, CaptureError> {
        (**self).next_item()
    }

    fn device_info(&self) -> SourceInfo {
        (**self).device_info()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
