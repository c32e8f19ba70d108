//! Capture-device stream feeding the loop recorder

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum AudioInputError {
    #[error("No audio input devices found")]
    NoDevices,
    #[error("Input device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to query input device: {0}")]
    ConfigError(String),
    #[error("Failed to open capture stream: {0}")]
    StreamError(String),
}

/// Average interleaved frames down to one channel
pub fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Copy,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    let scale = 1.0 / channels as f32;
    data.chunks_exact(channels)
        .map(|frame| frame.iter().map(|s| f32::from_sample_(*s)).sum::<f32>() * scale)
        .collect()
}

/// A running capture stream delivering mono blocks; dropping it closes the device
pub struct InputStreamHandle {
    paused: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl InputStreamHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the device; delivered blocks are always mono
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

impl Drop for InputStreamHandle {
    fn drop(&mut self) {
        self.paused.store(true, Ordering::Relaxed);
        debug!("Capture stream closed");
    }
}

pub struct AudioInputService;

impl AudioInputService {
    /// Names of capture devices on the default host
    pub fn device_names() -> Result<Vec<String>, AudioInputError> {
        let devices = cpal::default_host()
            .input_devices()
            .map_err(|e| AudioInputError::ConfigError(e.to_string()))?;
        let names: Vec<String> = devices.filter_map(|d| d.name().ok()).collect();
        if names.is_empty() { Err(AudioInputError::NoDevices) } else { Ok(names) }
    }

    fn open_device(name: &str) -> Result<Device, AudioInputError> {
        let host = cpal::default_host();
        if name.is_empty() || name == "default" {
            return host.default_input_device().ok_or(AudioInputError::NoDevices);
        }
        let mut devices = host
            .input_devices()
            .map_err(|e| AudioInputError::ConfigError(e.to_string()))?;
        devices
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| AudioInputError::DeviceNotFound(name.to_string()))
    }

    /// Open `name` at its default config and send mono blocks to `blocks`.
    /// A full channel drops the block rather than blocking the device callback.
    pub fn start_stream(name: &str, blocks: Sender<Vec<f32>>) -> Result<InputStreamHandle, AudioInputError> {
        let device = Self::open_device(name)?;
        let supported = device
            .default_input_config()
            .map_err(|e| AudioInputError::ConfigError(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: StreamConfig = supported.config();
        let paused = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::build::<f32>(&device, &config, blocks, paused.clone()),
            SampleFormat::I16 => Self::build::<i16>(&device, &config, blocks, paused.clone()),
            SampleFormat::I32 => Self::build::<i32>(&device, &config, blocks, paused.clone()),
            SampleFormat::U16 => Self::build::<u16>(&device, &config, blocks, paused.clone()),
            other => return Err(AudioInputError::ConfigError(format!("unsupported sample format {:?}", other))),
        }?;
        stream.play().map_err(|e| AudioInputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Capture stream running"
        );
        Ok(InputStreamHandle { paused, sample_rate, channels, _stream: stream })
    }

    fn build<T>(
        device: &Device,
        config: &StreamConfig,
        blocks: Sender<Vec<f32>>,
        paused: Arc<AtomicBool>,
    ) -> Result<cpal::Stream, AudioInputError>
    where
        T: SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        let channels = config.channels as usize;
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if !paused.load(Ordering::Relaxed) {
                        let _ = blocks.try_send(downmix(data, channels));
                    }
                },
                |err| error!(error = %err, "Capture stream error"),
                None,
            )
            .map_err(|e| AudioInputError::StreamError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_frames() {
        let stereo = [1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(downmix(&[0.25f32, -0.25], 1), vec![0.25, -0.25]);
    }

    #[test]
    fn test_downmix_converts_integer_samples() {
        let mono = downmix(&[i16::MAX, i16::MAX], 2);
        assert_eq!(mono.len(), 1);
        assert!((mono[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_downmix_drops_partial_frame() {
        assert_eq!(downmix(&[0.1f32, 0.2, 0.3], 2).len(), 1);
    }
}
