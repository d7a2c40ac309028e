//! HLS packaging: variant segmentation and the master playlist.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use vidpress_models::Quality;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Outcome of segmenting one encoded quality.
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub playlist: PathBuf,
    pub segment_count: usize,
}

/// Segment an encoded MP4 into `<quality>.m3u8` plus numbered MPEG-TS parts.
///
/// Stream-copy only: relies on the keyframe cadence fixed at transcode time.
pub async fn segment(
    input: impl AsRef<Path>,
    hls_dir: impl AsRef<Path>,
    quality: Quality,
    segment_secs: u32,
) -> MediaResult<SegmentOutcome> {
    let input = input.as_ref();
    let hls_dir = hls_dir.as_ref();

    fs::create_dir_all(hls_dir).await?;

    let playlist = hls_dir.join(format!("{}.m3u8", quality.label()));
    let segment_pattern = hls_dir.join(format!("{}_%03d.ts", quality.label()));

    let cmd = FfmpegCommand::new(input, &playlist).output_args([
        "-c".to_string(),
        "copy".to_string(),
        "-hls_time".to_string(),
        segment_secs.to_string(),
        "-hls_playlist_type".to_string(),
        "vod".to_string(),
        "-hls_flags".to_string(),
        "independent_segments+append_list".to_string(),
        "-hls_segment_type".to_string(),
        "mpegts".to_string(),
        "-start_number".to_string(),
        "0".to_string(),
        "-hls_segment_filename".to_string(),
        segment_pattern.to_string_lossy().to_string(),
    ]);

    FfmpegRunner::new().run(&cmd).await?;

    let segment_count = count_segments(hls_dir, quality).await?;

    info!(
        quality = %quality,
        segments = segment_count,
        "Segmented variant"
    );

    Ok(SegmentOutcome {
        playlist,
        segment_count,
    })
}

async fn count_segments(hls_dir: &Path, quality: Quality) -> MediaResult<usize> {
    let prefix = format!("{}_", quality.label());
    let mut count = 0;
    let mut entries = fs::read_dir(hls_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".ts") {
            count += 1;
        }
    }
    Ok(count)
}

/// One quality rung of the master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Peak bandwidth advertised to the player
    pub bandwidth: u64,
    /// Average bandwidth of the encoded file
    pub average_bandwidth: u64,
    /// Actual encoded dimensions, not the preset target
    pub width: u32,
    pub height: u32,
    /// RFC 6381 codecs string
    pub codecs: String,
    /// Human-readable variant name ("480p")
    pub name: String,
    /// Variant playlist filename relative to the master
    pub uri: String,
}

/// The variant master playlist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterPlaylist {
    /// Variants in ascending-resolution order
    pub variants: Vec<Variant>,
}

impl MasterPlaylist {
    /// Render the playlist text. `parse(render(x)) == x` and re-rendering a
    /// parsed playlist is byte-identical.
    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        for v in &self.variants {
            out.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},AVERAGE-BANDWIDTH={},RESOLUTION={}x{},CODECS=\"{}\",NAME=\"{}\"\n{}\n",
                v.bandwidth, v.average_bandwidth, v.width, v.height, v.codecs, v.name, v.uri
            ));
        }
        out
    }

    /// Parse a master playlist produced by `render`.
    pub fn parse(text: &str) -> MediaResult<Self> {
        let mut lines = text.lines();

        if lines.next() != Some("#EXTM3U") {
            return Err(MediaError::InvalidPlaylist("missing #EXTM3U header".to_string()));
        }

        let mut variants = Vec::new();
        while let Some(line) = lines.next() {
            if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                let uri = lines
                    .next()
                    .filter(|l| !l.starts_with('#') && !l.is_empty())
                    .ok_or_else(|| {
                        MediaError::InvalidPlaylist("stream-inf without URI line".to_string())
                    })?;
                variants.push(parse_variant(attrs, uri)?);
            }
        }

        Ok(Self { variants })
    }

    /// Write the rendered playlist to disk.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> MediaResult<()> {
        fs::write(path.as_ref(), self.render()).await?;
        Ok(())
    }
}

fn parse_variant(attrs: &str, uri: &str) -> MediaResult<Variant> {
    let mut bandwidth = None;
    let mut average_bandwidth = None;
    let mut resolution = None;
    let mut codecs = None;
    let mut name = None;

    for (key, value) in split_attributes(attrs) {
        match key.as_str() {
            "BANDWIDTH" => bandwidth = value.parse().ok(),
            "AVERAGE-BANDWIDTH" => average_bandwidth = value.parse().ok(),
            "RESOLUTION" => {
                resolution = value
                    .split_once('x')
                    .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));
            }
            "CODECS" => codecs = Some(value),
            "NAME" => name = Some(value),
            _ => {}
        }
    }

    let (width, height) = resolution
        .ok_or_else(|| MediaError::InvalidPlaylist("missing RESOLUTION".to_string()))?;

    Ok(Variant {
        bandwidth: bandwidth
            .ok_or_else(|| MediaError::InvalidPlaylist("missing BANDWIDTH".to_string()))?,
        average_bandwidth: average_bandwidth
            .ok_or_else(|| MediaError::InvalidPlaylist("missing AVERAGE-BANDWIDTH".to_string()))?,
        width,
        height,
        codecs: codecs.ok_or_else(|| MediaError::InvalidPlaylist("missing CODECS".to_string()))?,
        name: name.ok_or_else(|| MediaError::InvalidPlaylist("missing NAME".to_string()))?,
        uri: uri.to_string(),
    })
}

/// Split an attribute list on commas outside quoted values, stripping quotes.
fn split_attributes(attrs: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in attrs.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                push_attribute(&mut out, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_attribute(&mut out, &current);
    out
}

fn push_attribute(out: &mut Vec<(String, String)>, raw: &str) {
    if let Some((key, value)) = raw.split_once('=') {
        out.push((
            key.trim().to_string(),
            value.trim().trim_matches('"').to_string(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist() -> MasterPlaylist {
        MasterPlaylist {
            variants: vec![
                Variant {
                    bandwidth: 325_000,
                    average_bandwidth: 212_000,
                    width: 256,
                    height: 144,
                    codecs: "avc1.4d000d,mp4a.40.2".to_string(),
                    name: "144p".to_string(),
                    uri: "144p.m3u8".to_string(),
                },
                Variant {
                    bandwidth: 1_300_000,
                    average_bandwidth: 911_000,
                    width: 854,
                    height: 480,
                    codecs: "avc1.4d001f,mp4a.40.2".to_string(),
                    name: "480p".to_string(),
                    uri: "480p.m3u8".to_string(),
                },
            ],
        }
    }

    #[test]
    fn render_emits_version_3() {
        let text = playlist().render();
        assert!(text.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(text.contains("RESOLUTION=256x144"));
        assert!(text.contains("CODECS=\"avc1.4d000d,mp4a.40.2\""));
        assert!(text.contains("NAME=\"480p\"\n480p.m3u8\n"));
    }

    #[test]
    fn parse_render_round_trip_is_byte_identical() {
        let original = playlist().render();
        let parsed = MasterPlaylist::parse(&original).unwrap();
        assert_eq!(parsed, playlist());
        assert_eq!(parsed.render(), original);
    }

    #[test]
    fn codecs_commas_survive_attribute_splitting() {
        let attrs = split_attributes(
            "BANDWIDTH=325000,CODECS=\"avc1.4d000d,mp4a.40.2\",NAME=\"144p\"",
        );
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[1].1, "avc1.4d000d,mp4a.40.2");
    }

    #[test]
    fn parse_rejects_missing_header() {
        assert!(MasterPlaylist::parse("#EXT-X-VERSION:3\n").is_err());
    }

    #[test]
    fn parse_rejects_dangling_stream_inf() {
        let text = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=1,AVERAGE-BANDWIDTH=1,RESOLUTION=2x2,CODECS=\"a\",NAME=\"n\"\n";
        assert!(MasterPlaylist::parse(text).is_err());
    }
}
