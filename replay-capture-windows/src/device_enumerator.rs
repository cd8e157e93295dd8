//! Default endpoint resolution via the MMDevice API.
//!
//! Resolves the default render endpoint (for loopback) and the default
//! capture endpoint (microphone) to a friendly name and shared-mode mix
//! format. Also owns the per-thread COM initialization guard.

use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use replay_capture_core::{AudioDevice, AudioFormat, CaptureError, SourceInfo, StreamKind};

/// Keeps COM initialized (MTA) on the current thread until dropped.
pub(crate) struct ComGuard;

impl ComGuard {
    pub(crate) fn init_mta() -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::Device(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// Data flow of the endpoint behind an audio stream.
pub(crate) fn data_flow(kind: StreamKind) -> Result<EDataFlow, CaptureError> {
    match kind {
        StreamKind::System => Ok(eRender),
        StreamKind::Mic => Ok(eCapture),
        StreamKind::Video => Err(CaptureError::ConfigurationFailed(
            "video has no audio endpoint".into(),
        )),
    }
}

/// MMDevice enumerator. Requires COM on the calling thread.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| CaptureError::DeviceNotAvailable(format!("audio subsystem unavailable: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// The default endpoint for `kind`.
    pub fn default_endpoint(&self, kind: StreamKind) -> Result<IMMDevice, CaptureError> {
        let flow = data_flow(kind)?;
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(flow, eConsole)
                .map_err(|e| CaptureError::DeviceNotAvailable(format!("no default {} device: {}", kind, e)))
        }
    }

    /// Resolve the default endpoint for `kind` with its mix format.
    pub fn default_device(&self, kind: StreamKind) -> Result<AudioDevice, CaptureError> {
        let device = self.default_endpoint(kind)?;
        unsafe {
            let id = device
                .GetId()
                .ok()
                .and_then(|id| id.to_string().ok())
                .unwrap_or_else(|| format!("default-{}", kind.short_name()));
            let name = friendly_name(&device).unwrap_or_else(|| format!("Default {}", kind));

            let client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::DeviceNotAvailable(format!("{}: Activate failed: {}", name, e)))?;
            let format_ptr = client
                .GetMixFormat()
                .map_err(|e| CaptureError::Device(format!("{}: GetMixFormat failed: {}", name, e)))?;
            let format = AudioFormat {
                sample_rate: (*format_ptr).nSamplesPerSec,
                channels: (*format_ptr).nChannels,
            };
            CoTaskMemFree(Some(format_ptr as *const _));

            Ok(AudioDevice {
                info: SourceInfo {
                    id,
                    name,
                    kind,
                    is_default: true,
                },
                format,
            })
        }
    }
}

/// `PKEY_Device_FriendlyName` of an endpoint.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
        let name = value.to_string();
        (!name.is_empty()).then_some(name)
    }
}
