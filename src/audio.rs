use std::path::Path;
use std::process::Command;

use anyhow::{Context, anyhow, bail};
use hound::WavReader;
use serde::Deserialize;
use tracing::debug;

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV file '{}'", path.display()))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_duration(json: &str) -> anyhow::Result<f64> {
    let probe: ProbeOutput = serde_json::from_str(json).context("unexpected ffprobe output")?;
    let raw = probe
        .format
        .duration
        .ok_or_else(|| anyhow!("ffprobe reported no duration"))?;
    let duration: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid duration '{}'", raw))?;
    if !duration.is_finite() || duration <= 0.0 {
        bail!("audio duration must be positive, got {}", duration);
    }
    Ok(duration)
}

pub fn probe_duration_seconds(ffprobe: &Path, path: &Path) -> anyhow::Result<f64> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
        .arg(path)
        .output()
        .with_context(|| format!("failed to run {}", ffprobe.display()))?;
    if !output.status.success() {
        bail!(
            "ffprobe could not read '{}': {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

/// WAV files are measured directly, everything else (mp3 from the TTS step) through ffprobe.
pub fn audio_duration_seconds(ffprobe: &Path, path: &Path) -> anyhow::Result<f64> {
    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        match wav_duration_seconds(path) {
            Ok(duration) if duration > 0.0 => return Ok(duration),
            Ok(_) => bail!("audio file '{}' is empty", path.display()),
            Err(err) => debug!("hound rejected {}, falling back to ffprobe: {:#}", path.display(), err),
        }
    }
    probe_duration_seconds(ffprobe, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_silence(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f64).round() as u32;
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn wav_duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.wav");
        write_silence(&path, 1.5, 8000);
        let duration = audio_duration_seconds(Path::new("ffprobe-not-needed"), &path).unwrap();
        assert!((duration - 1.5).abs() < 1e-9);
    }

    #[test]
    fn ffprobe_json_is_parsed() {
        let json = r#"{"format": {"duration": "12.480000"}}"#;
        assert!((parse_probe_duration(json).unwrap() - 12.48).abs() < 1e-9);
        assert!(parse_probe_duration(r#"{"format": {}}"#).is_err());
        assert!(parse_probe_duration(r#"{"format": {"duration": "N/A"}}"#).is_err());
        assert!(parse_probe_duration(r#"{"format": {"duration": "0.0"}}"#).is_err());
    }

    #[test]
    fn missing_probe_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.mp3");
        std::fs::write(&path, b"not audio").unwrap();
        let result = audio_duration_seconds(Path::new("/nonexistent/ffprobe"), &path);
        assert!(result.is_err());
    }
}
