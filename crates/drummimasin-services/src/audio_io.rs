//! Realtime output device stream

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SupportedStreamConfig};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to query output device: {0}")]
    ConfigError(String),
    #[error("Failed to open output stream: {0}")]
    StreamError(String),
}

/// Default output device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

pub struct AudioOutputService;

impl AudioOutputService {
    fn open() -> Result<Device, AudioOutputError> {
        cpal::default_host().default_output_device().ok_or(AudioOutputError::NoDevices)
    }

    pub fn default_device_info() -> Result<OutputDeviceInfo, AudioOutputError> {
        let device = Self::open()?;
        let default = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;
        Ok(OutputDeviceInfo {
            name: device.name().unwrap_or_default(),
            sample_rate: default.sample_rate().0,
            channels: default.channels(),
        })
    }

    /// An f32 config at `rate` if the device offers one, else its default
    fn pick_config(device: &Device, rate: u32) -> Result<SupportedStreamConfig, AudioOutputError> {
        let wanted = SampleRate(rate);
        let exact = device.supported_output_configs().ok().and_then(|mut ranges| {
            ranges.find_map(|range| {
                let covers = range.min_sample_rate() <= wanted && wanted <= range.max_sample_rate();
                (range.sample_format() == SampleFormat::F32 && covers).then(|| range.with_sample_rate(wanted))
            })
        });
        match exact {
            Some(config) => Ok(config),
            None => {
                debug!(rate, "No f32 config at the requested rate, using device default");
                device
                    .default_output_config()
                    .map_err(|e| AudioOutputError::ConfigError(e.to_string()))
            }
        }
    }
}

/// Pulls interleaved f32 frames from a render callback; outputs silence once stopped
pub struct RealtimeOutputStream {
    running: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    /// Open the default device, preferring `rate`.
    /// `render` receives the device buffer with its actual rate and channel count.
    pub fn start<F>(rate: u32, mut render: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let device = AudioOutputService::open()?;
        let supported = AudioOutputService::pick_config(&device, rate)?;
        let (sample_rate, channels) = (supported.sample_rate().0, supported.channels());
        let running = Arc::new(AtomicBool::new(true));

        let stream = {
            let running = running.clone();
            device
                .build_output_stream(
                    &supported.config(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if running.load(Ordering::Relaxed) {
                            render(data, sample_rate, channels);
                        } else {
                            data.fill(0.0);
                        }
                    },
                    |err| error!(error = %err, "Output stream error"),
                    None,
                )
                .map_err(|e| AudioOutputError::StreamError(e.to_string()))?
        };
        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Output stream running"
        );
        Ok(Self { running, sample_rate, channels, _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
