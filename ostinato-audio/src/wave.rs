//! In-memory sample data and WAV file I/O.

use std::path::{Path, PathBuf};

/// Interleaved stereo f32 audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    samples: Vec<f32>,
    rate: u32,
    name: String,
    path: Option<PathBuf>,
}

impl Wave {
    /// Build from interleaved samples with any channel count. Mono is
    /// duplicated to both sides; channels beyond the second are dropped.
    pub fn from_interleaved(samples: &[f32], channels: u16, rate: u32, name: &str) -> Self {
        let channels = channels.max(1) as usize;
        let frames = samples.len() / channels;
        let mut stereo = Vec::with_capacity(frames * 2);
        for frame in samples.chunks_exact(channels) {
            let l = frame[0];
            let r = if channels > 1 { frame[1] } else { l };
            stereo.push(l);
            stereo.push(r);
        }
        Self {
            samples: stereo,
            rate,
            name: name.to_string(),
            path: None,
        }
    }

    /// Take ownership of already interleaved stereo samples.
    pub fn from_stereo(samples: Vec<f32>, rate: u32, name: &str) -> Self {
        Self {
            samples,
            rate,
            name: name.to_string(),
            path: None,
        }
    }

    /// Silent wave of `frames` frames.
    pub fn empty(frames: usize, rate: u32, name: &str) -> Self {
        Self {
            samples: vec![0.0; frames * 2],
            rate,
            name: name.to_string(),
            path: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| format!("Failed to open WAV {}: {}", path.display(), e))?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| format!("Failed to read samples: {}", e))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| format!("Failed to read samples: {}", e))?
            }
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut wave = Self::from_interleaved(&samples, spec.channels, spec.sample_rate, &name);
        wave.path = Some(path.to_path_buf());
        log::debug!(target: "wave", "loaded {} ({} frames @ {} Hz)", name, wave.frames(), wave.rate);
        Ok(wave)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| format!("Failed to create WAV writer: {}", e))?;

        for &sample in &self.samples {
            writer
                .write_sample(sample)
                .map_err(|e| format!("Failed to write sample: {}", e))?;
        }

        writer
            .finalize()
            .map_err(|e| format!("Failed to finalize WAV: {}", e))?;

        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// (left, right) at `frame`; silence past the end.
    #[inline]
    pub fn frame(&self, frame: usize) -> (f32, f32) {
        let i = frame * 2;
        match self.samples.get(i..i + 2) {
            Some(s) => (s[0], s[1]),
            None => (0.0, 0.0),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_is_duplicated() {
        let w = Wave::from_interleaved(&[0.1, 0.2, 0.3], 1, 44100, "m");
        assert_eq!(w.frames(), 3);
        assert_eq!(w.frame(1), (0.2, 0.2));
        assert_eq!(w.frame(3), (0.0, 0.0));
    }

    #[test]
    fn save_and_load_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let w = Wave::from_interleaved(&[0.5, -0.5, 0.25, -0.25], 2, 48000, "take");
        w.save(&path).unwrap();

        let back = Wave::load(&path).unwrap();
        assert_eq!(back.frames(), 2);
        assert_eq!(back.rate(), 48000);
        assert_eq!(back.name(), "take");
        assert_eq!(back.frame(1), (0.25, -0.25));
        assert_eq!(back.path(), Some(path.as_path()));
    }

    #[test]
    fn loads_integer_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16384i16).unwrap();
        writer.finalize().unwrap();

        let w = Wave::load(&path).unwrap();
        assert_eq!(w.frames(), 1);
        assert!((w.frame(0).0 - 0.5).abs() < 1e-4);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Wave::load(Path::new("/nonexistent/x.wav")).is_err());
    }
}
