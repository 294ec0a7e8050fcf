//! Editable clip/track timeline.
//!
//! A timeline is derived once from a script and afterwards changed only
//! through the edit operations in [`edit`] or a validated replacement.

mod edit;
mod store;

pub use edit::{
    move_clip, resize_clip, set_playback_range, timeline_from_script, to_render_props,
    RenderProps, SubtitleCue, TimelineOperation, DEFAULT_FPS, MIN_CLIP_DURATION_MS,
};
pub use store::{timeline_path, FsTimelineStore, TimelineStore};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactType;

/// Invalid timeline content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("Invalid playback range: in {in_ms} > out {out_ms}")]
    InvertedRange { in_ms: i64, out_ms: i64 },

    #[error("Negative time on {0}")]
    NegativeTime(String),

    #[error("Clip {clip_id} is shorter than {min}ms")]
    ClipTooShort { clip_id: String, min: i64 },

    #[error("Clip {0} volume outside 0..=2")]
    VolumeOutOfRange(String),
}

/// Kind of content a track holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Subtitle,
    Image,
    Video,
    Character,
    Bgm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRange {
    pub in_ms: i64,
    pub out_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMarker {
    pub id: String,
    pub time_ms: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineClip {
    pub id: String,
    pub asset_type: ArtifactType,
    pub asset_path: String,
    pub start_ms: i64,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl TimelineClip {
    pub fn new(
        id: impl Into<String>,
        asset_type: ArtifactType,
        asset_path: impl Into<String>,
        start_ms: i64,
        duration_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            asset_type,
            asset_path: asset_path.into(),
            start_ms,
            duration_ms,
            in_ms: None,
            out_ms: None,
            volume: None,
            fade_in_ms: None,
            fade_out_ms: None,
            text: None,
            style: None,
        }
    }

    pub fn end_ms(&self) -> i64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineTrack {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    pub clips: Vec<TimelineClip>,
}

/// Full editable timeline of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineData {
    pub playback_range: PlaybackRange,
    pub tracks: Vec<TimelineTrack>,
    pub markers: Vec<TimelineMarker>,
}

impl TimelineData {
    pub fn find_clip(&self, track_id: &str, clip_id: &str) -> Option<&TimelineClip> {
        self.tracks
            .iter()
            .find(|t| t.id == track_id)?
            .clips
            .iter()
            .find(|c| c.id == clip_id)
    }

    /// Check the invariants every stored timeline must satisfy.
    pub fn validate(&self) -> Result<(), TimelineError> {
        let range = self.playback_range;
        if range.in_ms < 0 {
            return Err(TimelineError::NegativeTime("playback range".to_string()));
        }
        if range.in_ms > range.out_ms {
            return Err(TimelineError::InvertedRange {
                in_ms: range.in_ms,
                out_ms: range.out_ms,
            });
        }

        for marker in &self.markers {
            if marker.time_ms < 0 {
                return Err(TimelineError::NegativeTime(format!("marker {}", marker.id)));
            }
        }

        for clip in self.tracks.iter().flat_map(|t| t.clips.iter()) {
            let negative = clip.start_ms < 0
                || [clip.in_ms, clip.out_ms, clip.fade_in_ms, clip.fade_out_ms]
                    .iter()
                    .flatten()
                    .any(|v| *v < 0);
            if negative {
                return Err(TimelineError::NegativeTime(format!("clip {}", clip.id)));
            }
            if clip.duration_ms < MIN_CLIP_DURATION_MS {
                return Err(TimelineError::ClipTooShort {
                    clip_id: clip.id.clone(),
                    min: MIN_CLIP_DURATION_MS,
                });
            }
            if let Some(volume) = clip.volume {
                if !(0.0..=2.0).contains(&volume) {
                    return Err(TimelineError::VolumeOutOfRange(clip.id.clone()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TimelineData {
        TimelineData {
            playback_range: PlaybackRange { in_ms: 0, out_ms: 3000 },
            markers: vec![],
            tracks: vec![TimelineTrack {
                id: "t1".to_string(),
                name: "bgm".to_string(),
                track_type: TrackType::Bgm,
                clips: vec![TimelineClip::new("c1", ArtifactType::Audio, "bgm.wav", 0, 3000)],
            }],
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["playbackRange"]["outMs"], 3000);
        assert_eq!(json["tracks"][0]["type"], "bgm");
        assert_eq!(json["tracks"][0]["clips"][0]["assetType"], "audio");
        assert!(json["tracks"][0]["clips"][0].get("volume").is_none());
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_content() {
        let mut tl = sample();
        tl.playback_range = PlaybackRange { in_ms: 10, out_ms: 5 };
        assert!(matches!(tl.validate(), Err(TimelineError::InvertedRange { .. })));

        let mut tl = sample();
        tl.tracks[0].clips[0].duration_ms = 50;
        assert!(matches!(tl.validate(), Err(TimelineError::ClipTooShort { .. })));

        let mut tl = sample();
        tl.tracks[0].clips[0].volume = Some(2.5);
        assert_eq!(
            tl.validate(),
            Err(TimelineError::VolumeOutOfRange("c1".to_string()))
        );

        let mut tl = sample();
        tl.tracks[0].clips[0].fade_in_ms = Some(-1);
        assert!(matches!(tl.validate(), Err(TimelineError::NegativeTime(_))));
    }

    #[test]
    fn test_find_clip() {
        let tl = sample();
        assert!(tl.find_clip("t1", "c1").is_some());
        assert!(tl.find_clip("t1", "missing").is_none());
        assert!(tl.find_clip("missing", "c1").is_none());
    }
}
