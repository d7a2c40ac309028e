//! Per-job pipeline state machine.
//!
//! Stages run strictly in order inside an attempt:
//! queued → downloading → validating → compressing (×4) → hls_conversion →
//! thumbnail_compression → complete. The layout directory is cleared before
//! the first write so reprocessing is idempotent, and progress only ever
//! advances within an attempt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tracing::{debug, info, warn};

use vidpress_media::{
    hls, probe_video, resize_to_webp, transcode, FetchKind, FetchPolicy, Fetcher, MasterPlaylist,
    MediaError, WebpOptions,
};
use vidpress_models::{
    is_allowed_codec, is_allowed_container, layout::source_extension, ErrorKind, Job, JobResult,
    JobStats, MediaLayout, Quality, QualityStat, ValidationResult, VideoInfo, WebhookEvent,
    MAX_DURATION_SECS, MAX_SOURCE_BYTES,
};
use vidpress_queue::Broker;
use vidpress_webhook::WebhookDispatcher;

use crate::config::WorkerConfig;
use crate::error::PipelineFailure;

/// Milestone percents per stage.
mod milestone {
    pub const QUEUED: u8 = 0;
    pub const DOWNLOADING: u8 = 0;
    pub const VALIDATING: u8 = 25;
    pub const COMPRESS: [(u8, u8); 4] = [(25, 37), (37, 49), (49, 61), (61, 73)];
    pub const HLS: u8 = 75;
    pub const THUMBNAIL: u8 = 80;
    pub const COMPLETE: u8 = 100;
}

/// Monotonic progress within one attempt.
struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    fn new() -> Self {
        Self { current: 0 }
    }

    /// Advance to `percent`; regressions are clamped to the high-water mark.
    fn advance(&mut self, percent: u8) -> u8 {
        self.current = self.current.max(percent.min(100));
        self.current
    }
}

/// One produced quality with its encoded file.
struct Produced {
    quality: Quality,
    path: PathBuf,
    size: u64,
    elapsed_ms: u64,
}

/// The per-job pipeline engine.
pub struct Pipeline {
    config: Arc<WorkerConfig>,
    broker: Arc<Broker>,
    dispatcher: Arc<WebhookDispatcher>,
    fetcher: Fetcher,
}

impl Pipeline {
    pub fn new(
        config: Arc<WorkerConfig>,
        broker: Arc<Broker>,
        dispatcher: Arc<WebhookDispatcher>,
    ) -> Self {
        let policy = FetchPolicy::from_allowlist(
            &config.allowed_download_domains,
            config.verify_ssl_downloads,
        );
        Self {
            config,
            broker,
            dispatcher,
            fetcher: Fetcher::new(policy),
        }
    }

    fn layout(&self, job: &Job) -> MediaLayout {
        MediaLayout::new(
            &self.config.content_root,
            &self.config.base_url,
            job.request.post_id,
            job.request.year,
            job.request.month,
        )
    }

    /// Drive one attempt to a result record or a classified failure.
    pub async fn run(&self, job: &Job) -> Result<JobResult, PipelineFailure> {
        let started = Instant::now();
        let layout = self.layout(job);
        let mut progress = ProgressTracker::new();

        self.report(job, &mut progress, milestone::QUEUED, "queued").await;

        // Cleanup is serialized before any write of this attempt.
        clean_layout(&layout)
            .await
            .map_err(|e| PipelineFailure::new(ErrorKind::Internal, e.to_string()))?;

        self.report(job, &mut progress, milestone::DOWNLOADING, "downloading")
            .await;
        let source = self.acquire_source(job, &layout).await?;

        self.report(job, &mut progress, milestone::VALIDATING, "validating")
            .await;
        let info = self.validate_source(&source).await?;

        let produced = self
            .compress_all(job, &layout, &source, &mut progress)
            .await?;

        self.report(job, &mut progress, milestone::HLS, "hls_conversion")
            .await;
        let (hls_variants, hls_master) = self.package_hls(&layout, &produced, &info).await;

        self.report(job, &mut progress, milestone::THUMBNAIL, "thumbnail_compression")
            .await;
        let thumbnail = self.compress_thumbnail(job, &layout).await;

        let result = self.build_result(
            &layout,
            &produced,
            hls_variants,
            hls_master,
            thumbnail,
            &info,
            started,
        );

        self.report(job, &mut progress, milestone::COMPLETE, "complete")
            .await;

        Ok(result)
    }

    /// Emit a milestone to the broker and the webhook throttler.
    async fn report(&self, job: &Job, progress: &mut ProgressTracker, percent: u8, stage: &str) {
        let percent = progress.advance(percent);

        if let Err(e) = self.broker.update_progress(&job.id, percent, stage).await {
            debug!(job_id = %job.id, "Progress update dropped: {}", e);
        }

        let event = WebhookEvent::progress(job, percent, stage);
        if let Err(e) = self.dispatcher.send(&event).await {
            warn!(job_id = %job.id, stage, "Progress webhook failed: {}", e);
        }
    }

    // ========================================================================
    // Stage: downloading
    // ========================================================================

    /// Local-first download policy: use the uploads copy when present,
    /// otherwise fetch the remote URL through the SSRF guard.
    async fn acquire_source(
        &self,
        job: &Job,
        layout: &MediaLayout,
    ) -> Result<PathBuf, PipelineFailure> {
        let local = self
            .config
            .uploads_root
            .join(job.request.media_path.trim_start_matches('/'));

        if fs::try_exists(&local).await.unwrap_or(false) {
            debug!(job_id = %job.id, path = %local.display(), "Using local source");
            return Ok(local);
        }

        let Some(url) = job.request.video_url.as_deref() else {
            return Err(PipelineFailure::new(
                ErrorKind::FileNotFound,
                format!("no local source at {} and no remote URL", local.display()),
            ));
        };

        let ext = source_extension(Path::new(
            url.split('?').next().unwrap_or(url),
        ));
        let dest = layout.original_path(&ext);

        info!(job_id = %job.id, url, "Fetching remote source");
        self.fetcher
            .fetch(url, FetchKind::Video, &dest)
            .await
            .map_err(PipelineFailure::from)?;

        Ok(dest)
    }

    // ========================================================================
    // Stage: validating
    // ========================================================================

    async fn validate_source(&self, source: &Path) -> Result<VideoInfo, PipelineFailure> {
        let info = match probe_video(source).await {
            Ok(info) => info,
            Err(e @ MediaError::Corrupted(_)) => {
                return Err(PipelineFailure::new(ErrorKind::VideoCorrupted, e.to_string()))
            }
            Err(e) => return Err(PipelineFailure::from(e)),
        };

        let result = validate_info(&info);
        if !result.valid {
            let kind = result.kind.unwrap_or(ErrorKind::Validation);
            return Err(PipelineFailure::new(kind, result.errors.join("; ")));
        }

        Ok(info)
    }

    // ========================================================================
    // Stage: compressing_<Q>
    // ========================================================================

    /// Transcode every rung in fixed order. Individual failures are absorbed
    /// as long as at least one rung succeeds.
    async fn compress_all(
        &self,
        job: &Job,
        layout: &MediaLayout,
        source: &Path,
        progress: &mut ProgressTracker,
    ) -> Result<Vec<Produced>, PipelineFailure> {
        fs::create_dir_all(layout.dir())
            .await
            .map_err(|e| PipelineFailure::new(ErrorKind::Internal, e.to_string()))?;

        let mut produced = Vec::new();
        let mut failures = Vec::new();

        for (quality, (start, end)) in Quality::ALL.iter().zip(milestone::COMPRESS) {
            let stage = format!("compressing_{}", quality.label());
            self.report(job, progress, start, &stage).await;

            let output = layout.compressed_path(*quality);
            let job_id = job.id.clone();
            let q = *quality;
            let outcome = transcode(
                source,
                &output,
                *quality,
                self.config.segment_secs,
                move |p| {
                    debug!(job_id = %job_id, quality = %q, out_time_ms = p.out_time_ms, "Encoding");
                },
            )
            .await;

            match outcome {
                Ok(t) => {
                    let size = fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
                    produced.push(Produced {
                        quality: *quality,
                        path: output,
                        size,
                        elapsed_ms: t.elapsed.as_millis() as u64,
                    });
                    self.report(job, progress, end, &stage).await;
                }
                Err(e) => {
                    warn!(job_id = %job.id, quality = %quality, "Transcode failed: {}", e);
                    failures.push(format!("{}: {}", quality, e));
                    let _ = fs::remove_file(&output).await;
                }
            }
        }

        if produced.is_empty() {
            return Err(PipelineFailure::new(
                ErrorKind::TranscodeFailed,
                format!("all qualities failed: {}", failures.join("; ")),
            ));
        }

        Ok(produced)
    }

    // ========================================================================
    // Stage: hls_conversion (non-fatal)
    // ========================================================================

    /// Segment every produced rung and write the master playlist listing the
    /// variants that segmented, ascending by resolution. Failure of the whole
    /// stage only costs the HLS URLs.
    async fn package_hls(
        &self,
        layout: &MediaLayout,
        produced: &[Produced],
        info: &VideoInfo,
    ) -> (BTreeMap<Quality, String>, Option<String>) {
        let mut variants = Vec::new();
        let mut urls = BTreeMap::new();

        for quality in Quality::ASCENDING {
            let Some(p) = produced.iter().find(|p| p.quality == quality) else {
                continue;
            };

            match hls::segment(&p.path, layout.hls_dir(), quality, self.config.segment_secs).await {
                Ok(outcome) => {
                    // Advertise the real encoded dimensions, not the preset.
                    let (width, height) = match probe_video(&p.path).await {
                        Ok(encoded) => (encoded.width, encoded.height),
                        Err(e) => {
                            warn!(quality = %quality, "Probe of encoded file failed: {}", e);
                            let preset = quality.preset();
                            (preset.scaled_width(info.width, info.height), preset.height)
                        }
                    };

                    variants.push(hls::Variant {
                        bandwidth: quality.preset().hls_bandwidth,
                        average_bandwidth: average_bandwidth(p.size, info.duration),
                        width,
                        height,
                        codecs: quality.preset().codecs.to_string(),
                        name: quality.label().to_string(),
                        uri: format!("{}.m3u8", quality.label()),
                    });
                    urls.insert(quality, layout.variant_playlist_url(quality));
                    debug!(quality = %quality, segments = outcome.segment_count, "Variant ready");
                }
                Err(e) => {
                    warn!(quality = %quality, "Segmenting failed: {}", e);
                }
            }
        }

        if variants.is_empty() {
            return (BTreeMap::new(), None);
        }

        let master = MasterPlaylist { variants };
        match master.write_to(layout.master_playlist()).await {
            Ok(()) => (urls, Some(layout.master_playlist_url())),
            Err(e) => {
                warn!("Writing master playlist failed: {}", e);
                (BTreeMap::new(), None)
            }
        }
    }

    // ========================================================================
    // Stage: thumbnail_compression (non-fatal)
    // ========================================================================

    async fn compress_thumbnail(&self, job: &Job, layout: &MediaLayout) -> Option<String> {
        let options = WebpOptions {
            quality: self.config.thumbnail_quality,
            max_width: self.config.thumbnail_max_width,
            max_height: self.config.thumbnail_max_height,
        };
        let output = layout.thumbnail_path();

        // Prefer a local thumbnail from the uploads root.
        if let Some(path) = job.request.thumbnail_path.as_deref() {
            let local = self.config.uploads_root.join(path.trim_start_matches('/'));
            if fs::try_exists(&local).await.unwrap_or(false) {
                return match resize_to_webp(&local, &output, options).await {
                    Ok(_) => Some(layout.thumbnail_url()),
                    Err(e) => {
                        warn!(job_id = %job.id, "Thumbnail encode failed: {}", e);
                        None
                    }
                };
            }
        }

        let url = job.request.thumbnail_url.as_deref()?;
        let staged = std::env::temp_dir().join(format!("vp_thumb_{}", job.request.post_id));

        let result = async {
            self.fetcher.fetch(url, FetchKind::Image, &staged).await?;
            resize_to_webp(&staged, &output, options).await
        }
        .await;
        let _ = fs::remove_file(&staged).await;

        match result {
            Ok(_) => Some(layout.thumbnail_url()),
            Err(e) => {
                warn!(job_id = %job.id, "Thumbnail stage failed: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Result record
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        layout: &MediaLayout,
        produced: &[Produced],
        hls_variants: BTreeMap<Quality, String>,
        hls_master: Option<String>,
        thumbnail: Option<String>,
        info: &VideoInfo,
        started: Instant,
    ) -> JobResult {
        let compressed: BTreeMap<Quality, String> = produced
            .iter()
            .map(|p| (p.quality, layout.compressed_url(p.quality)))
            .collect();

        let primary_size = Quality::ALL
            .iter()
            .find_map(|q| produced.iter().find(|p| p.quality == *q))
            .map(|p| p.size)
            .unwrap_or(0);

        JobResult {
            compressed,
            hls_variants,
            hls_master,
            thumbnail,
            stats: JobStats {
                original_size: info.size,
                compressed_size: primary_size,
                compression_ratio: JobStats::compression_ratio(info.size, primary_size),
                duration: info.duration,
                processing_time_ms: started.elapsed().as_millis() as u64,
                qualities: produced
                    .iter()
                    .map(|p| QualityStat {
                        quality: p.quality,
                        size: p.size,
                        elapsed_ms: p.elapsed_ms,
                    })
                    .collect(),
            },
        }
    }
}

/// Enforce the validation limits on a probe result.
pub fn validate_info(info: &VideoInfo) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if info.duration > MAX_DURATION_SECS {
        result.push(
            ErrorKind::DurationTooLong,
            format!("duration {:.2}s exceeds {:.0}s", info.duration, MAX_DURATION_SECS),
        );
    }
    if info.size > MAX_SOURCE_BYTES {
        result.push(
            ErrorKind::FileTooLarge,
            format!("size {} exceeds {} bytes", info.size, MAX_SOURCE_BYTES),
        );
    }
    if !is_allowed_codec(&info.video_codec) {
        result.push(
            ErrorKind::InvalidCodec,
            format!("codec '{}' not allowed", info.video_codec),
        );
    }
    if !is_allowed_container(&info.container) {
        result.push(
            ErrorKind::InvalidContainer,
            format!("container '{}' not allowed", info.container),
        );
    }

    result
}

/// Delete prior outputs under the layout directory so the attempt starts
/// from a clean slate: `original.*`, `compressed_*.mp4`, `hls/`,
/// `thumbnail.*`.
pub async fn clean_layout(layout: &MediaLayout) -> std::io::Result<()> {
    let dir = layout.dir();
    if !fs::try_exists(&dir).await.unwrap_or(false) {
        return Ok(());
    }

    let mut entries = fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy().to_string();
        if !MediaLayout::is_reset_entry(&name) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        debug!(path = %path.display(), "Removed prior output");
    }

    Ok(())
}

/// Average bandwidth of an encoded file in bits/second.
fn average_bandwidth(size_bytes: u64, duration_secs: f64) -> u64 {
    if duration_secs <= 0.0 {
        return 0;
    }
    ((size_bytes as f64 * 8.0) / duration_secs).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn info() -> VideoInfo {
        VideoInfo {
            duration: 10.0,
            video_codec: "h264".to_string(),
            audio_codec: Some("aac".to_string()),
            container: "mp4".to_string(),
            width: 1920,
            height: 1080,
            bitrate: 4_000_000,
            fps: 30.0,
            size: 5 * 1024 * 1024,
        }
    }

    #[test]
    fn valid_source_passes() {
        assert!(validate_info(&info()).valid);
    }

    #[test]
    fn duration_boundary() {
        let mut i = info();
        i.duration = 300.0;
        assert!(validate_info(&i).valid);

        i.duration = 300.01;
        let result = validate_info(&i);
        assert!(!result.valid);
        assert_eq!(result.kind, Some(ErrorKind::DurationTooLong));
    }

    #[test]
    fn size_boundary() {
        let mut i = info();
        i.size = MAX_SOURCE_BYTES;
        assert!(validate_info(&i).valid);

        i.size = MAX_SOURCE_BYTES + 1;
        let result = validate_info(&i);
        assert!(!result.valid);
        assert_eq!(result.kind, Some(ErrorKind::FileTooLarge));
    }

    #[test]
    fn codec_and_container_rejections() {
        let mut i = info();
        i.video_codec = "wmv2".to_string();
        assert_eq!(validate_info(&i).kind, Some(ErrorKind::InvalidCodec));

        let mut i = info();
        i.container = "avi".to_string();
        assert_eq!(validate_info(&i).kind, Some(ErrorKind::InvalidContainer));
    }

    #[test]
    fn progress_never_regresses() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.advance(25), 25);
        assert_eq!(tracker.advance(37), 37);
        assert_eq!(tracker.advance(25), 37);
        assert_eq!(tracker.advance(100), 100);
    }

    #[test]
    fn average_bandwidth_math() {
        // 1 MiB over 8 seconds = 1 Mibit/s
        assert_eq!(average_bandwidth(1024 * 1024, 8.0), 1_048_576);
        assert_eq!(average_bandwidth(1024, 0.0), 0);
    }

    #[tokio::test]
    async fn cleanup_removes_only_reset_entries() {
        let dir = TempDir::new().unwrap();
        let layout = MediaLayout::new(dir.path(), "http://localhost", 42, 2025, 1);
        let job_dir = layout.dir();
        tokio::fs::create_dir_all(job_dir.join("hls")).await.unwrap();

        for name in [
            "original.mov",
            "compressed_480p.mp4",
            "thumbnail.webp",
            "keepme.txt",
        ] {
            tokio::fs::write(job_dir.join(name), b"x").await.unwrap();
        }
        tokio::fs::write(job_dir.join("hls/480p.m3u8"), b"x").await.unwrap();

        clean_layout(&layout).await.unwrap();

        assert!(!job_dir.join("original.mov").exists());
        assert!(!job_dir.join("compressed_480p.mp4").exists());
        assert!(!job_dir.join("thumbnail.webp").exists());
        assert!(!job_dir.join("hls").exists());
        assert!(job_dir.join("keepme.txt").exists());
    }

    #[tokio::test]
    async fn cleanup_tolerates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let layout = MediaLayout::new(dir.path().join("absent"), "http://localhost", 1, 2025, 1);
        assert!(clean_layout(&layout).await.is_ok());
    }
}
