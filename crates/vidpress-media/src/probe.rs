//! FFprobe metadata extraction.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use vidpress_models::VideoInfo;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, serde::Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a container for metadata.
///
/// The file is flagged corrupted when it has no video stream, zero duration
/// or zero dimensions.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::Corrupted("no video stream".to_string()))?;

    let audio_codec = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .and_then(|s| s.codec_name.clone());

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);

    if duration <= 0.0 {
        return Err(MediaError::Corrupted("zero duration".to_string()));
    }
    if width == 0 || height == 0 {
        return Err(MediaError::Corrupted("zero dimensions".to_string()));
    }

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_deref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .or(video_stream.r_frame_rate.as_deref())
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        video_codec: video_stream.codec_name.clone().unwrap_or_default(),
        audio_codec,
        container: container_name(probe.format.format_name.as_deref().unwrap_or_default()),
        width,
        height,
        bitrate,
        fps,
        size,
    })
}

/// FFprobe reports comma-separated aliases ("mov,mp4,m4a,3gp,3g2,mj2");
/// take the first concrete one we recognise, else the first token.
fn container_name(format_name: &str) -> String {
    let tokens: Vec<&str> = format_name.split(',').map(str::trim).collect();
    for known in ["mp4", "mov", "webm", "mkv", "matroska"] {
        if tokens.contains(&known) {
            return if known == "matroska" { "mkv".to_string() } else { known.to_string() };
        }
    }
    tokens.first().unwrap_or(&"").to_string()
}

/// Parse a frame rate string (e.g. "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_parsing() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("30/0"), None);
    }

    #[test]
    fn container_aliases_resolve() {
        assert_eq!(container_name("mov,mp4,m4a,3gp,3g2,mj2"), "mp4");
        assert_eq!(container_name("matroska,webm"), "webm");
        assert_eq!(container_name("matroska"), "mkv");
        assert_eq!(container_name("avi"), "avi");
    }
}
