//! Decoded sample buffers and a small voice pool that plays them

use std::io::Cursor;
use std::sync::Arc;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use thiserror::Error;

const MAX_VOICES: usize = 4;
/// Fade applied when a voice is cut
const RELEASE_SECS: f32 = 0.005;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read WAV: {0}")]
    Wav(#[from] hound::Error),
    #[error("WAV file is empty")]
    Empty,
    #[error("Resample error: {0}")]
    Resample(String),
}

/// Mono audio at the engine sample rate, shared cheaply between threads
#[derive(Clone)]
pub struct SampleBuffer {
    data: Arc<Vec<f32>>,
    sample_rate: u32,
    name: String,
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl SampleBuffer {
    pub fn from_samples(name: impl Into<String>, data: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            data: Arc::new(data),
            sample_rate,
            name: name.into(),
        }
    }

    /// Decode WAV bytes, mix to mono and resample to the engine rate
    pub fn decode_wav(bytes: &[u8], name: &str, engine_rate: u32) -> Result<Self, DecodeError> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<_, _>>()?
            }
        };

        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mono: Vec<f32> = if channels == 1 {
            raw
        } else {
            raw.chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        let data = resample(&mono, spec.sample_rate, engine_rate)?;
        Ok(Self::from_samples(name, data, engine_rate))
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_secs(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Whether two handles share the same allocation
    pub fn same_data(&self, other: &SampleBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, DecodeError> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    Ok(output.into_iter().flatten().collect())
}

#[derive(Debug, Clone)]
struct PlayerVoice {
    active: bool,
    buffer: Option<SampleBuffer>,
    position: f64,
    speed: f64,
    velocity: f32,
    releasing: bool,
    release_gain: f32,
    release_step: f32,
    age: usize,
}

impl PlayerVoice {
    fn new() -> Self {
        Self {
            active: false,
            buffer: None,
            position: 0.0,
            speed: 1.0,
            velocity: 0.0,
            releasing: false,
            release_gain: 1.0,
            release_step: 0.0,
            age: 0,
        }
    }

    fn trigger(&mut self, buffer: SampleBuffer, speed: f64, velocity: f32) {
        self.active = true;
        self.buffer = Some(buffer);
        self.position = 0.0;
        self.speed = speed;
        self.velocity = velocity;
        self.releasing = false;
        self.release_gain = 1.0;
        self.release_step = 0.0;
        self.age = 0;
    }

    fn start_release(&mut self, sample_rate: f32) {
        if !self.releasing {
            self.releasing = true;
            let fade_samples = (sample_rate * RELEASE_SECS).max(1.0);
            self.release_step = 1.0 / fade_samples;
        }
    }

    fn tick(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }
        let Some(buffer) = &self.buffer else {
            self.active = false;
            return 0.0;
        };
        let data = buffer.data();

        self.age += 1;
        let pos = self.position;
        let idx = pos as usize;

        if idx + 1 >= data.len() {
            self.active = false;
            self.buffer = None;
            return 0.0;
        }

        // Linear interpolation
        let frac = (pos - idx as f64) as f32;
        let sample = data[idx] + frac * (data[idx + 1] - data[idx]);
        self.position += self.speed;

        if self.releasing {
            self.release_gain -= self.release_step;
            if self.release_gain <= 0.0 {
                self.active = false;
                self.buffer = None;
                return 0.0;
            }
        }

        sample * self.velocity * self.release_gain
    }
}

/// One-shot sample playback with a few overlapping voices
#[derive(Debug)]
pub struct SamplePlayer {
    voices: Vec<PlayerVoice>,
    sample_rate: f32,
}

impl SamplePlayer {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: (0..MAX_VOICES).map(|_| PlayerVoice::new()).collect(),
            sample_rate,
        }
    }

    /// Start `buffer` from the top at `speed` (1.0 is original pitch)
    pub fn play(&mut self, buffer: &SampleBuffer, speed: f64, velocity: f32) {
        // fade whatever is still ringing so retriggers do not stack up
        for voice in &mut self.voices {
            if voice.active {
                voice.start_release(self.sample_rate);
            }
        }
        let index = self
            .voices
            .iter()
            .position(|v| !v.active)
            .unwrap_or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            });
        self.voices[index].trigger(buffer.clone(), speed, velocity.clamp(0.0, 1.0));
    }

    pub fn set_speed(&mut self, speed: f64) {
        for voice in &mut self.voices {
            if voice.active && !voice.releasing {
                voice.speed = speed;
            }
        }
    }

    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            if voice.active {
                voice.start_release(self.sample_rate);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.voices.iter().any(|v| v.active)
    }

    pub fn next_sample(&mut self) -> f32 {
        self.voices.iter_mut().map(PlayerVoice::tick).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mixes_stereo_to_mono() {
        let bytes = wav_bytes(&[0.5, 0.0, 0.5, 0.0, 0.5, 0.0], 48000, 2);
        let buffer = SampleBuffer::decode_wav(&bytes, "hit", 48000).unwrap();
        assert_eq!(buffer.len(), 3);
        assert!(buffer.data().iter().all(|s| (s - 0.25).abs() < 1e-3));
        assert_eq!(buffer.name(), "hit");
    }

    #[test]
    fn test_decode_resamples_to_engine_rate() {
        let samples: Vec<f32> = (0..22050).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let bytes = wav_bytes(&samples, 22050, 1);
        let buffer = SampleBuffer::decode_wav(&bytes, "tone", 44100).unwrap();
        assert_eq!(buffer.sample_rate(), 44100);
        assert!((buffer.duration_secs() - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SampleBuffer::decode_wav(b"not a wav file", "x", 48000).is_err());
        let empty = wav_bytes(&[], 48000, 1);
        assert!(matches!(SampleBuffer::decode_wav(&empty, "x", 48000), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_double_speed_finishes_in_half_the_time() {
        let buffer = SampleBuffer::from_samples("ramp", vec![0.5; 1000], 48000);
        let mut player = SamplePlayer::new(48000.0);
        player.play(&buffer, 2.0, 1.0);
        let mut frames = 0;
        while player.is_active() {
            player.next_sample();
            frames += 1;
        }
        assert!((499..=501).contains(&frames), "frames {}", frames);
    }

    #[test]
    fn test_retrigger_fades_previous_voice() {
        let buffer = SampleBuffer::from_samples("pad", vec![1.0; 48000], 48000);
        let mut player = SamplePlayer::new(48000.0);
        player.play(&buffer, 1.0, 1.0);
        for _ in 0..100 {
            player.next_sample();
        }
        player.play(&buffer, 1.0, 1.0);
        // after the 5 ms fade only the new voice remains
        for _ in 0..480 {
            player.next_sample();
        }
        assert!((player.next_sample() - 1.0).abs() < 1e-6);
    }
}
