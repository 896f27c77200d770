use std::path::Path;

use anyhow::{Context, ensure};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

pub const FALLBACK_SPEC: WavSpec = WavSpec {
    channels: 1,
    sample_rate: 22_050,
    bits_per_sample: 16,
    sample_format: SampleFormat::Int,
};

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV {}", path.display()))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

pub fn wav_spec(path: &Path) -> anyhow::Result<WavSpec> {
    Ok(WavReader::open(path)
        .with_context(|| format!("failed to open WAV {}", path.display()))?
        .spec())
}

pub fn write_silence(path: &Path, seconds: f64, spec: WavSpec) -> anyhow::Result<f64> {
    ensure!(seconds > 0.0 && seconds.is_finite(), "silence length must be positive");
    let frames = (seconds * spec.sample_rate as f64).round().max(1.0) as u64;
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for _ in 0..frames * spec.channels as u64 {
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => writer.write_sample(0.0f32)?,
            (SampleFormat::Int, 8) => writer.write_sample(0i8)?,
            (SampleFormat::Int, 16) => writer.write_sample(0i16)?,
            (SampleFormat::Int, _) => writer.write_sample(0i32)?,
        }
    }
    writer.finalize()?;
    Ok(frames as f64 / spec.sample_rate as f64)
}

pub fn estimate_duration(text: &str, words_per_minute: u32) -> f64 {
    let words = text.split_whitespace().count() as f64;
    let seconds = words / words_per_minute.max(1) as f64 * 60.0 * 1.1;
    seconds.max(0.5)
}

pub fn concat_wavs(parts: &[&Path], out: &Path) -> anyhow::Result<()> {
    ensure!(!parts.is_empty(), "nothing to concatenate");
    let spec = wav_spec(parts[0])?;
    let mut writer = WavWriter::create(out, spec)
        .with_context(|| format!("failed to create {}", out.display()))?;
    for part in parts {
        let mut reader = WavReader::open(part)
            .with_context(|| format!("failed to open WAV {}", part.display()))?;
        ensure!(
            reader.spec() == spec,
            "{} has format {:?}, expected {:?}",
            part.display(),
            reader.spec(),
            spec
        );
        match spec.sample_format {
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Int if spec.bits_per_sample <= 8 => {
                for sample in reader.samples::<i8>() {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Int if spec.bits_per_sample <= 16 => {
                for sample in reader.samples::<i16>() {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                }
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn write_tone(path: &Path, seconds: f64, spec: WavSpec) {
    let frames = (seconds * spec.sample_rate as f64).round() as u64;
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames * spec.channels as u64 {
        writer.write_sample(((i % 64) as i16 - 32) * 100).unwrap();
    }
    writer.finalize().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_comes_from_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let stereo = WavSpec { channels: 2, ..FALLBACK_SPEC };
        write_tone(&path, 1.5, stereo);
        assert!((wav_duration_seconds(&path).unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn silence_has_requested_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        let written = write_silence(&path, 0.75, FALLBACK_SPEC).unwrap();
        assert!((written - 0.75).abs() < 1.0 / 22_050.0);
        assert!((wav_duration_seconds(&path).unwrap() - written).abs() < 1e-12);
    }

    #[test]
    fn concatenation_is_gapless() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let out = dir.path().join("out.wav");
        write_tone(&a, 1.0, FALLBACK_SPEC);
        write_silence(&b, 0.5, FALLBACK_SPEC).unwrap();
        concat_wavs(&[a.as_path(), b.as_path()], &out).unwrap();
        assert!((wav_duration_seconds(&out).unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn concatenation_rejects_mixed_formats() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_tone(&a, 0.1, FALLBACK_SPEC);
        write_tone(&b, 0.1, WavSpec { sample_rate: 44_100, ..FALLBACK_SPEC });
        assert!(concat_wavs(&[a.as_path(), b.as_path()], &dir.path().join("o.wav")).is_err());
    }

    #[test]
    fn estimate_scales_with_word_count() {
        assert!((estimate_duration("one two three four five", 175) - 5.0 / 175.0 * 66.0).abs() < 1e-9);
        assert_eq!(estimate_duration("", 175), 0.5);
    }
}
