use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info};

fn base_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn h264_aac_output_args(fps: u32) -> Vec<String> {
    [
        "-c:v", "libx264", "-preset", "medium", "-pix_fmt", "yuv420p", "-r",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([fps.to_string()])
    .chain(
        ["-c:a", "aac", "-b:a", "192k", "-ar", "44100", "-ac", "2"]
            .iter()
            .map(|s| s.to_string()),
    )
    .collect()
}

/// Raw RGBA frames on stdin, narration audio as the second input, trimmed to the audio length.
pub fn segment_args(
    width: u32,
    height: u32,
    fps: u32,
    audio: &Path,
    duration: f64,
    output: &Path,
) -> Vec<String> {
    let mut args = base_args();
    args.extend(
        [
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s:v".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
            "-i".to_string(),
            audio.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
        ],
    );
    args.extend(h264_aac_output_args(fps));
    args.push("-t".to_string());
    args.push(format!("{:.6}", duration));
    args.push(output.to_string_lossy().into_owned());
    args
}

pub fn concat_args(list: &Path, fps: u32, output: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend(
        ["-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(list.to_string_lossy().into_owned());
    args.extend(h264_aac_output_args(fps));
    args.push("-movflags".to_string());
    args.push("+faststart".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// One line per segment in the concat demuxer's list format.
pub fn concat_list(segments: &[PathBuf]) -> String {
    let mut list = String::new();
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

fn spawn_error(ffmpeg: &Path, args: &[String], error: std::io::Error) -> anyhow::Error {
    if error.kind() == ErrorKind::NotFound {
        anyhow!(
            "ffmpeg executable not found (resolved_path={}). Install ffmpeg or pass --ffmpeg.",
            ffmpeg.display()
        )
    } else {
        anyhow!(
            "failed to spawn ffmpeg process (resolved_path={}, args='{}'): {error}",
            ffmpeg.display(),
            args.join(" ")
        )
    }
}

/// Streams frames into a running ffmpeg that muxes them with the scene audio.
pub struct SegmentEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_len: usize,
    args: Vec<String>,
    ffmpeg: PathBuf,
}

impl SegmentEncoder {
    pub fn spawn(
        ffmpeg: &Path,
        width: u32,
        height: u32,
        fps: u32,
        audio: &Path,
        duration: f64,
        output: &Path,
    ) -> Result<Self> {
        let args = segment_args(width, height, fps, audio, duration, output);
        debug!("ffmpeg {}", args.join(" "));
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| spawn_error(ffmpeg, &args, error))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            frame_len: (width as usize) * (height as usize) * 4,
            args,
            ffmpeg: ffmpeg.to_path_buf(),
        })
    }

    pub fn write_frame(&mut self, rgba: &[u8]) -> Result<()> {
        if rgba.len() != self.frame_len {
            bail!(
                "frame has {} bytes, encoder expects {}",
                rgba.len(),
                self.frame_len
            );
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        if let Err(error) = stdin.write_all(rgba) {
            // ffmpeg exited early; its stderr says why.
            let tail = self.abort();
            return Err(anyhow!("failed to write frame to ffmpeg stdin: {error} ({tail})"));
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().context("failed to flush ffmpeg stdin")?;
        }
        let status = self.child.wait().context("failed waiting for ffmpeg process")?;
        let stderr_tail = read_stderr_tail(&mut self.child)?;
        if !status.success() {
            bail!(
                "ffmpeg failed with status {status} (resolved_path={}, args='{}', stderr_tail='{}')",
                self.ffmpeg.display(),
                self.args.join(" "),
                stderr_tail
            );
        }
        Ok(())
    }

    fn abort(&mut self) -> String {
        drop(self.stdin.take());
        let _ = self.child.wait();
        read_stderr_tail(&mut self.child).unwrap_or_default()
    }
}

impl Drop for SegmentEncoder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Joins encoded segments back to back with hard cuts.
pub fn concat_segments(ffmpeg: &Path, segments: &[PathBuf], fps: u32, work_dir: &Path, output: &Path) -> Result<()> {
    if segments.is_empty() {
        bail!("no segments to concatenate");
    }
    let list_path = work_dir.join("segments.txt");
    {
        let mut f = File::create(&list_path)
            .with_context(|| format!("failed to create concat list {}", list_path.display()))?;
        f.write_all(concat_list(segments).as_bytes())?;
    }
    info!("Concatenating {} segments into {}", segments.len(), output.display());

    let args = concat_args(&list_path, fps, output);
    let result = Command::new(ffmpeg)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| spawn_error(ffmpeg, &args, error))?;
    if !result.status.success() {
        bail!(
            "ffmpeg concat failed with status {} (stderr_tail='{}')",
            result.status,
            last_n_chars(&String::from_utf8_lossy(&result.stderr), 500)
        );
    }
    Ok(())
}

fn read_stderr_tail(child: &mut Child) -> Result<String> {
    let Some(mut pipe) = child.stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    Ok(last_n_chars(&String::from_utf8_lossy(&buf), 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    s.chars()
        .skip(count.saturating_sub(max_chars))
        .collect::<String>()
        .trim()
        .to_owned()
}
