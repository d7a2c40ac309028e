//! Submission payload from the upstream CMS.

use serde::{Deserialize, Serialize};

use crate::error_kind::ErrorKind;

/// A compression request as posted to `/api/compress`.
///
/// Field names on the wire match the upstream WordPress plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionRequest {
    /// Post identifier (positive)
    #[serde(rename = "postId")]
    pub post_id: u64,

    /// Source media path relative to the uploads root
    #[serde(rename = "wpMediaPath")]
    pub media_path: String,

    /// Remote media URL, fetched when no local copy exists
    #[serde(rename = "wpVideoUrl", skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Thumbnail path relative to the uploads root
    #[serde(rename = "wpThumbnailPath", skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,

    /// Remote thumbnail URL
    #[serde(rename = "wpThumbnailUrl", skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Public post URL (informational)
    #[serde(rename = "wpPostUrl", skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,

    /// Year slot for the media layout
    pub year: i32,

    /// Month slot for the media layout
    pub month: u32,
}

impl CompressionRequest {
    /// Validate the payload; returns the first violation.
    pub fn validate(&self) -> Result<(), (ErrorKind, String)> {
        if self.post_id == 0 {
            return Err((ErrorKind::Validation, "postId must be positive".to_string()));
        }
        if self.media_path.trim().is_empty() {
            return Err((ErrorKind::Validation, "wpMediaPath must not be empty".to_string()));
        }
        if !(2000..=2100).contains(&self.year) {
            return Err((
                ErrorKind::Validation,
                format!("year {} outside [2000, 2100]", self.year),
            ));
        }
        if !(1..=12).contains(&self.month) {
            return Err((
                ErrorKind::Validation,
                format!("month {} outside [1, 12]", self.month),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CompressionRequest {
        CompressionRequest {
            post_id: 42,
            media_path: "/wp-content/uploads/2025/01/clip.mp4".to_string(),
            video_url: Some("https://allowed.example.com/clip.mp4".to_string()),
            thumbnail_path: None,
            thumbnail_url: None,
            post_url: None,
            year: 2025,
            month: 1,
        }
    }

    #[test]
    fn accepts_valid_payload() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_zero_post_id() {
        let mut req = valid();
        req.post_id = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_empty_media_path() {
        let mut req = valid();
        req.media_path = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_slots() {
        let mut req = valid();
        req.year = 1999;
        assert!(req.validate().is_err());

        let mut req = valid();
        req.month = 13;
        assert!(req.validate().is_err());
    }

    #[test]
    fn wire_names_match_upstream() {
        let json = serde_json::to_value(valid()).unwrap();
        assert!(json.get("postId").is_some());
        assert!(json.get("wpMediaPath").is_some());
        assert!(json.get("wpVideoUrl").is_some());
    }
}
