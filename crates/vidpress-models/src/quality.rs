//! Output quality ladder and per-quality encoder presets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One rung of the output ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "480p")]
    Q480,
    #[serde(rename = "360p")]
    Q360,
    #[serde(rename = "240p")]
    Q240,
    #[serde(rename = "144p")]
    Q144,
}

impl Quality {
    /// Processing order: highest quality first.
    pub const ALL: [Quality; 4] = [Quality::Q480, Quality::Q360, Quality::Q240, Quality::Q144];

    /// Master playlist order: ascending resolution.
    pub const ASCENDING: [Quality; 4] = [Quality::Q144, Quality::Q240, Quality::Q360, Quality::Q480];

    pub fn label(&self) -> &'static str {
        match self {
            Quality::Q480 => "480p",
            Quality::Q360 => "360p",
            Quality::Q240 => "240p",
            Quality::Q144 => "144p",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "480p" => Some(Quality::Q480),
            "360p" => Some(Quality::Q360),
            "240p" => Some(Quality::Q240),
            "144p" => Some(Quality::Q144),
            _ => None,
        }
    }

    /// The fixed encoder preset for this rung.
    pub fn preset(&self) -> &'static QualityPreset {
        match self {
            Quality::Q480 => &PRESET_480P,
            Quality::Q360 => &PRESET_360P,
            Quality::Q240 => &PRESET_240P,
            Quality::Q144 => &PRESET_144P,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Encoder parameters for one quality rung.
#[derive(Debug, Clone, Serialize)]
pub struct QualityPreset {
    /// Target height in pixels; width follows the source aspect ratio
    pub height: u32,
    /// Target video bitrate
    pub video_bitrate: &'static str,
    /// Rate-control ceiling
    pub max_bitrate: &'static str,
    /// Constant rate factor
    pub crf: u8,
    /// Bandwidth advertised in the master playlist
    pub hls_bandwidth: u64,
    /// RFC 6381 codecs string for the master playlist
    pub codecs: &'static str,
}

impl QualityPreset {
    /// Width preserving `aspect` (w/h of the source), rounded to the nearest
    /// even integer.
    pub fn scaled_width(&self, src_width: u32, src_height: u32) -> u32 {
        if src_height == 0 {
            return 0;
        }
        let exact = f64::from(src_width) * f64::from(self.height) / f64::from(src_height);
        ((exact / 2.0).round() as u32) * 2
    }
}

pub static PRESET_480P: QualityPreset = QualityPreset {
    height: 480,
    video_bitrate: "800k",
    max_bitrate: "1200k",
    crf: 23,
    hls_bandwidth: 1_300_000,
    codecs: "avc1.4d001f,mp4a.40.2",
};

pub static PRESET_360P: QualityPreset = QualityPreset {
    height: 360,
    video_bitrate: "500k",
    max_bitrate: "750k",
    crf: 23,
    hls_bandwidth: 850_000,
    codecs: "avc1.4d001f,mp4a.40.2",
};

pub static PRESET_240P: QualityPreset = QualityPreset {
    height: 240,
    video_bitrate: "300k",
    max_bitrate: "450k",
    crf: 22,
    hls_bandwidth: 550_000,
    codecs: "avc1.4d0015,mp4a.40.2",
};

pub static PRESET_144P: QualityPreset = QualityPreset {
    height: 144,
    video_bitrate: "150k",
    max_bitrate: "225k",
    crf: 21,
    hls_bandwidth: 325_000,
    codecs: "avc1.4d000d,mp4a.40.2",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_order_is_descending() {
        assert_eq!(Quality::ALL[0], Quality::Q480);
        assert_eq!(Quality::ALL[3], Quality::Q144);
    }

    #[test]
    fn playlist_order_is_ascending() {
        assert_eq!(Quality::ASCENDING[0], Quality::Q144);
        assert_eq!(Quality::ASCENDING[3], Quality::Q480);
    }

    #[test]
    fn preset_table_matches_ladder() {
        assert_eq!(Quality::Q480.preset().height, 480);
        assert_eq!(Quality::Q480.preset().crf, 23);
        assert_eq!(Quality::Q240.preset().crf, 22);
        assert_eq!(Quality::Q144.preset().hls_bandwidth, 325_000);
        assert_eq!(Quality::Q144.preset().codecs, "avc1.4d000d,mp4a.40.2");
    }

    #[test]
    fn scaled_width_is_even_and_aspect_preserving() {
        // 1920x1080 -> 480p: exact 853.33, nearest even 854
        assert_eq!(Quality::Q480.preset().scaled_width(1920, 1080), 854);
        // 1280x720 -> 360p: exact 640
        assert_eq!(Quality::Q360.preset().scaled_width(1280, 720), 640);
        // Degenerate source
        assert_eq!(Quality::Q480.preset().scaled_width(1920, 0), 0);
    }

    #[test]
    fn label_round_trip() {
        for q in Quality::ALL {
            assert_eq!(Quality::from_label(q.label()), Some(q));
        }
        assert_eq!(Quality::from_label("720p"), None);
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&Quality::Q480).unwrap();
        assert_eq!(json, "\"480p\"");
    }
}
