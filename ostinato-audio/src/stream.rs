//! Audio I/O through cpal.
//!
//! The output stream drives [`Mixer::process`]. Line-in, when enabled, is
//! captured by a separate input stream into a ring the output callback
//! reads from.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};

use crate::mixer::Mixer;
use crate::rt_lock::RtMutex;

/// Interleaved stereo FIFO between the input and output callbacks.
pub struct InputRing {
    buffer: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
}

impl InputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(2)],
            read_pos: 0,
            write_pos: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append samples, overwriting the oldest ones when full.
    pub fn write(&mut self, samples: &[f32]) {
        let capacity = self.buffer.len();
        for &sample in samples {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
            if self.len == capacity {
                self.read_pos = (self.read_pos + 1) % capacity;
            } else {
                self.len += 1;
            }
        }
    }

    /// Fill `out` with the oldest samples; zero what the ring can't cover.
    pub fn read_into(&mut self, out: &mut [f32]) {
        let capacity = self.buffer.len();
        for slot in out.iter_mut() {
            if self.len == 0 {
                *slot = 0.0;
                continue;
            }
            *slot = self.buffer[self.read_pos];
            self.read_pos = (self.read_pos + 1) % capacity;
            self.len -= 1;
        }
    }
}

/// Spread interleaved device samples with `channels` channels to stereo.
fn to_stereo(data: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        0 => {}
        1 => {
            for &s in data {
                out.push(s);
                out.push(s);
            }
        }
        _ => {
            for frame in data.chunks(channels) {
                let l = frame[0];
                let r = frame.get(1).copied().unwrap_or(l);
                out.push(l);
                out.push(r);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub output_device: Option<String>,
    pub input_device: Option<String>,
    pub enable_input: bool,
}

/// Device names for the current host.
pub fn list_devices() -> (Vec<String>, Vec<String>) {
    let host = cpal::default_host();
    let outputs = host
        .output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default();
    let inputs = host
        .input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default();
    (outputs, inputs)
}

fn find_device(host: &Host, name: Option<&str>, input: bool) -> Result<Device, String> {
    match name {
        Some(name) => {
            let mut devices = if input {
                host.input_devices()
            } else {
                host.output_devices()
            }
            .map_err(|e| format!("Failed to list audio devices: {}", e))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| format!("No audio device named '{}'", name))
        }
        None => {
            let device = if input {
                host.default_input_device()
            } else {
                host.default_output_device()
            };
            device.ok_or_else(|| "No default audio device available".to_string())
        }
    }
}

/// Running output (and optional input) streams. Dropping it stops audio.
pub struct AudioStream {
    _output: Stream,
    _input: Option<Stream>,
    sample_rate: u32,
}

impl AudioStream {
    pub fn start(mixer: Mixer, options: &StreamOptions) -> Result<Self, String> {
        let host = cpal::default_host();
        let settings = mixer.engine().settings.clone();
        let device = find_device(&host, options.output_device.as_deref(), false)?;
        let default = device
            .default_output_config()
            .map_err(|e| format!("Failed to get output config: {}", e))?;
        let channels = default.channels() as usize;
        let config = StreamConfig {
            channels: default.channels(),
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(settings.buffer_frames as u32),
        };

        let ring = Arc::new(RtMutex::new(InputRing::new(settings.buffer_frames * 2 * 8)));
        let input = if options.enable_input {
            match Self::start_input(&host, options, &config, Arc::clone(&ring)) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    log::warn!(target: "audio", "input disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let has_input = input.is_some();

        let mut mixer = mixer;
        let mut block = vec![0.0_f32; settings.buffer_frames * 2];
        let mut line_in = vec![0.0_f32; settings.buffer_frames * 2];
        let output = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    if block.len() < frames * 2 {
                        block.resize(frames * 2, 0.0);
                        line_in.resize(frames * 2, 0.0);
                    }
                    let block = &mut block[..frames * 2];
                    if has_input {
                        let line_in = &mut line_in[..frames * 2];
                        match ring.try_lock_rt() {
                            Some(mut ring) => ring.read_into(line_in),
                            None => line_in.fill(0.0),
                        }
                    }
                    let input = has_input.then(|| &line_in[..frames * 2]);
                    mixer.process(block, input);
                    for (frame, stereo) in data.chunks_mut(channels.max(1)).zip(block.chunks_exact(2)) {
                        for (i, s) in frame.iter_mut().enumerate() {
                            *s = if i < 2 { stereo[i] } else { 0.0 };
                        }
                    }
                },
                |err| {
                    log::error!(target: "audio", "output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))?;
        output
            .play()
            .map_err(|e| format!("Failed to start output stream: {}", e))?;

        log::info!(
            target: "audio",
            "output stream started: {} Hz, {} frames, {} channel(s), input {}",
            settings.sample_rate,
            settings.buffer_frames,
            channels,
            if has_input { "on" } else { "off" }
        );
        Ok(Self {
            _output: output,
            _input: input,
            sample_rate: settings.sample_rate,
        })
    }

    fn start_input(
        host: &Host,
        options: &StreamOptions,
        output: &StreamConfig,
        ring: Arc<RtMutex<InputRing>>,
    ) -> Result<Stream, String> {
        let device = find_device(host, options.input_device.as_deref(), true)?;
        let default = device
            .default_input_config()
            .map_err(|e| format!("Failed to get input config: {}", e))?;
        let channels = default.channels() as usize;
        let config = StreamConfig {
            channels: default.channels(),
            sample_rate: output.sample_rate,
            buffer_size: output.buffer_size.clone(),
        };
        let mut stereo = Vec::with_capacity(8192);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    to_stereo(data, channels, &mut stereo);
                    if let Some(mut ring) = ring.try_lock_rt() {
                        ring.write(&stereo);
                    }
                },
                |err| {
                    log::error!(target: "audio", "input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Failed to build input stream: {}", e))?;
        stream
            .play()
            .map_err(|e| format!("Failed to start input stream: {}", e))?;
        Ok(stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_reads_in_order_and_zero_fills() {
        let mut ring = InputRing::new(8);
        ring.write(&[1.0, 2.0, 3.0]);
        let mut out = [9.0; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 0.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn ring_drops_oldest_when_full() {
        let mut ring = InputRing::new(4);
        ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(ring.len(), 4);
        let mut out = [0.0; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn mono_and_multichannel_fold_to_stereo() {
        let mut out = Vec::new();
        to_stereo(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
        to_stereo(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.4, 0.5]);
    }
}
