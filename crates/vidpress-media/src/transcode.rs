//! Fixed-ladder transcode contract.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::info;

use vidpress_models::Quality;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::progress::FfmpegProgress;

/// Outcome of a single-quality transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub elapsed: Duration,
}

/// Assemble the output arguments for one quality rung.
///
/// `segment_secs` fixes the keyframe cadence so the HLS stage can stream-copy.
pub fn transcode_args(quality: Quality, segment_secs: u32) -> Vec<String> {
    let preset = quality.preset();
    vec![
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a:0?".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "slow".to_string(),
        "-crf".to_string(),
        preset.crf.to_string(),
        "-profile:v".to_string(),
        "main".to_string(),
        "-level".to_string(),
        "3.1".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        preset.video_bitrate.to_string(),
        "-maxrate".to_string(),
        preset.max_bitrate.to_string(),
        "-bufsize".to_string(),
        preset.max_bitrate.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "64k".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-force_key_frames".to_string(),
        format!("expr:gte(t,n_forced*{})", segment_secs),
        "-sc_threshold".to_string(),
        "0".to_string(),
    ]
}

/// Transcode the source to one quality rung.
pub async fn transcode<F>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    quality: Quality,
    segment_secs: u32,
    on_progress: F,
) -> MediaResult<TranscodeOutcome>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let input = input.as_ref();
    let output = output.as_ref();
    let preset = quality.preset();

    let cmd = FfmpegCommand::new(input, output)
        .video_filter(format!("scale=-2:{}", preset.height))
        .output_args(transcode_args(quality, segment_secs));

    let start = Instant::now();
    FfmpegRunner::new()
        .run_with_progress(&cmd, on_progress)
        .await?;
    let elapsed = start.elapsed();

    info!(
        quality = %quality,
        elapsed_ms = elapsed.as_millis() as u64,
        output = %output.display(),
        "Transcode complete"
    );

    Ok(TranscodeOutcome { elapsed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_the_contract() {
        let args = transcode_args(Quality::Q480, 2);

        let pairs: Vec<(String, String)> = args
            .chunks(2)
            .map(|c| (c[0].clone(), c.get(1).cloned().unwrap_or_default()))
            .collect();

        let get = |flag: &str| {
            pairs
                .iter()
                .find(|(f, _)| f == flag)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(get("-c:v").as_deref(), Some("libx264"));
        assert_eq!(get("-preset").as_deref(), Some("slow"));
        assert_eq!(get("-crf").as_deref(), Some("23"));
        assert_eq!(get("-profile:v").as_deref(), Some("main"));
        assert_eq!(get("-level").as_deref(), Some("3.1"));
        assert_eq!(get("-pix_fmt").as_deref(), Some("yuv420p"));
        assert_eq!(get("-b:a").as_deref(), Some("64k"));
        assert_eq!(get("-ar").as_deref(), Some("44100"));
        assert_eq!(get("-ac").as_deref(), Some("2"));
        assert_eq!(get("-movflags").as_deref(), Some("+faststart"));
        assert_eq!(
            get("-force_key_frames").as_deref(),
            Some("expr:gte(t,n_forced*2)")
        );
        assert_eq!(get("-sc_threshold").as_deref(), Some("0"));
        // Audio mapping is optional so silent sources still transcode.
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a:0?"));
    }

    #[test]
    fn crf_tracks_the_preset_table() {
        assert!(transcode_args(Quality::Q240, 2).contains(&"22".to_string()));
        assert!(transcode_args(Quality::Q144, 2).contains(&"21".to_string()));
    }
}
