//! Deterministic on-disk layout and public URL scheme for one job.

use std::path::{Path, PathBuf};

use crate::quality::Quality;

/// Per-job output directory: `<content_root>/<YYYY>/<MM>/<postId>/`.
///
/// Owned by the pipeline engine; cleared at the start of every attempt so
/// reprocessing is idempotent.
#[derive(Debug, Clone)]
pub struct MediaLayout {
    content_root: PathBuf,
    base_url: String,
    post_id: u64,
    year: i32,
    month: u32,
}

impl MediaLayout {
    pub fn new(
        content_root: impl Into<PathBuf>,
        base_url: impl Into<String>,
        post_id: u64,
        year: i32,
        month: u32,
    ) -> Self {
        Self {
            content_root: content_root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            post_id,
            year,
            month,
        }
    }

    fn slot(&self) -> String {
        format!("{:04}/{:02}/{}", self.year, self.month, self.post_id)
    }

    /// The job's output directory.
    pub fn dir(&self) -> PathBuf {
        self.content_root.join(self.slot())
    }

    /// Retained source copy, extension taken from the fetched file.
    pub fn original_path(&self, ext: &str) -> PathBuf {
        self.dir().join(format!("original.{}", ext.trim_start_matches('.')))
    }

    pub fn compressed_path(&self, quality: Quality) -> PathBuf {
        self.dir().join(format!("compressed_{}.mp4", quality.label()))
    }

    pub fn hls_dir(&self) -> PathBuf {
        self.dir().join("hls")
    }

    pub fn variant_playlist(&self, quality: Quality) -> PathBuf {
        self.hls_dir().join(format!("{}.m3u8", quality.label()))
    }

    /// Segment filename pattern for the segmenter (`<q>_%03d.ts`).
    pub fn segment_pattern(&self, quality: Quality) -> PathBuf {
        self.hls_dir().join(format!("{}_%03d.ts", quality.label()))
    }

    pub fn master_playlist(&self) -> PathBuf {
        self.hls_dir().join("master.m3u8")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.dir().join("thumbnail.webp")
    }

    fn url(&self, file: &str) -> String {
        format!("{}/content/{}/{}", self.base_url, self.slot(), file)
    }

    pub fn compressed_url(&self, quality: Quality) -> String {
        self.url(&format!("compressed_{}.mp4", quality.label()))
    }

    pub fn variant_playlist_url(&self, quality: Quality) -> String {
        self.url(&format!("hls/{}.m3u8", quality.label()))
    }

    pub fn master_playlist_url(&self) -> String {
        self.url("hls/master.m3u8")
    }

    pub fn thumbnail_url(&self) -> String {
        self.url("thumbnail.webp")
    }

    /// Names under `dir()` that the pre-flight cleanup removes:
    /// `original.*`, `compressed_*.mp4`, `hls/`, `thumbnail.*`.
    pub fn is_reset_entry(name: &str) -> bool {
        name == "hls"
            || name.starts_with("original.")
            || name.starts_with("thumbnail.")
            || (name.starts_with("compressed_") && name.ends_with(".mp4"))
    }
}

/// Extract a lowercase file extension, defaulting to `mp4`.
pub fn source_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> MediaLayout {
        MediaLayout::new("/var/media/content", "https://cdn.example.com/", 42, 2025, 1)
    }

    #[test]
    fn directory_is_zero_padded() {
        assert_eq!(
            layout().dir(),
            PathBuf::from("/var/media/content/2025/01/42")
        );
    }

    #[test]
    fn paths_follow_the_layout() {
        let l = layout();
        assert_eq!(
            l.compressed_path(Quality::Q480),
            PathBuf::from("/var/media/content/2025/01/42/compressed_480p.mp4")
        );
        assert_eq!(
            l.variant_playlist(Quality::Q144),
            PathBuf::from("/var/media/content/2025/01/42/hls/144p.m3u8")
        );
        assert_eq!(
            l.master_playlist(),
            PathBuf::from("/var/media/content/2025/01/42/hls/master.m3u8")
        );
        assert_eq!(
            l.thumbnail_path(),
            PathBuf::from("/var/media/content/2025/01/42/thumbnail.webp")
        );
    }

    #[test]
    fn urls_have_the_content_prefix_and_no_double_slash() {
        let l = layout();
        assert_eq!(
            l.compressed_url(Quality::Q360),
            "https://cdn.example.com/content/2025/01/42/compressed_360p.mp4"
        );
        assert_eq!(
            l.master_playlist_url(),
            "https://cdn.example.com/content/2025/01/42/hls/master.m3u8"
        );
    }

    #[test]
    fn reset_entries() {
        assert!(MediaLayout::is_reset_entry("original.mov"));
        assert!(MediaLayout::is_reset_entry("compressed_480p.mp4"));
        assert!(MediaLayout::is_reset_entry("hls"));
        assert!(MediaLayout::is_reset_entry("thumbnail.webp"));
        assert!(!MediaLayout::is_reset_entry("notes.txt"));
        assert!(!MediaLayout::is_reset_entry("compressed_480p.mkv"));
    }

    #[test]
    fn extension_defaults_to_mp4() {
        assert_eq!(source_extension(Path::new("/a/clip.MOV")), "mov");
        assert_eq!(source_extension(Path::new("/a/clip")), "mp4");
    }
}
