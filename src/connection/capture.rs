use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::SessionError;

/// The local capture device backing the outbound media track.
#[derive(Debug, Clone)]
pub struct CaptureDevice {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Acquires the default input device. No device, or a device without an
/// input configuration, is fatal to the connection attempt.
pub fn acquire_input_device() -> Result<CaptureDevice, SessionError> {
    let host = cpal::default_host();
    tracing::debug!(host = ?host.id(), "probing capture devices");

    let device = host.default_input_device().ok_or_else(|| {
        SessionError::CaptureDevice("no default input device".to_string())
    })?;

    let config = device
        .default_input_config()
        .map_err(|err| SessionError::CaptureDevice(err.to_string()))?;

    let name = device.name().unwrap_or_else(|_| "unknown".to_string());
    Ok(CaptureDevice {
        name,
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}
