//! Windows microphone privacy check.
//!
//! Microphone access for desktop apps is governed by Settings > Privacy >
//! Microphone. When the toggle is off, activating the capture endpoint
//! fails with `E_ACCESSDENIED`. Loopback capture needs no permission.

use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use replay_capture_core::{CaptureError, StreamKind};

use crate::device_enumerator::{ComGuard, DeviceEnumerator};

/// Fails with `ConfigurationFailed` when microphone access is disabled.
pub fn check_microphone_access() -> Result<(), CaptureError> {
    let _com = ComGuard::init_mta()?;
    let device = DeviceEnumerator::new()?.default_endpoint(StreamKind::Mic)?;

    let result: windows::core::Result<IAudioClient> = unsafe { device.Activate(CLSCTX_ALL, None) };
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.code() == E_ACCESSDENIED || e.code() == AUDCLNT_E_DEVICE_IN_USE => {
            Err(CaptureError::ConfigurationFailed(format!(
                "microphone access denied ({}); check Settings > Privacy > Microphone",
                e
            )))
        }
        Err(e) => {
            log::warn!("unexpected error checking microphone access: {}", e);
            Ok(())
        }
    }
}
