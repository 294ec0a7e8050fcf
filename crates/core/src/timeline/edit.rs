//! Pure timeline transforms and the render projection.

use serde::{Deserialize, Serialize};

use super::{
    PlaybackRange, TimelineClip, TimelineData, TimelineMarker, TimelineTrack, TrackType,
};
use crate::artifacts::ArtifactType;
use crate::registry::StepName;
use crate::script::Script;

/// Shortest clip the editor allows.
pub const MIN_CLIP_DURATION_MS: i64 = 100;

/// Frame rate used when none is configured.
pub const DEFAULT_FPS: u32 = 30;

/// Render duration never drops below one second.
const MIN_RENDER_DURATION_MS: i64 = 1000;

const MIN_SUBTITLE_DURATION_MS: i64 = 1200;
const MS_PER_CHAR: i64 = 100;
const MIN_TIMELINE_DURATION_MS: i64 = 5000;

fn update_clip(
    timeline: &TimelineData,
    track_id: &str,
    clip_id: &str,
    f: impl Fn(&mut TimelineClip),
) -> TimelineData {
    let mut updated = timeline.clone();
    updated
        .tracks
        .iter_mut()
        .filter(|t| t.id == track_id)
        .flat_map(|t| t.clips.iter_mut())
        .filter(|c| c.id == clip_id)
        .for_each(f);
    updated
}

/// Move a clip to `new_start_ms`, clamped at zero.
pub fn move_clip(
    timeline: &TimelineData,
    track_id: &str,
    clip_id: &str,
    new_start_ms: i64,
) -> TimelineData {
    update_clip(timeline, track_id, clip_id, |clip| {
        clip.start_ms = new_start_ms.max(0);
    })
}

/// Resize a clip to `new_duration_ms`, clamped at [`MIN_CLIP_DURATION_MS`].
pub fn resize_clip(
    timeline: &TimelineData,
    track_id: &str,
    clip_id: &str,
    new_duration_ms: i64,
) -> TimelineData {
    update_clip(timeline, track_id, clip_id, |clip| {
        clip.duration_ms = new_duration_ms.max(MIN_CLIP_DURATION_MS);
    })
}

/// Replace the playback range. `in` is clamped at zero and `out` at `in`.
pub fn set_playback_range(timeline: &TimelineData, in_ms: i64, out_ms: i64) -> TimelineData {
    let in_ms = in_ms.max(0);
    let out_ms = out_ms.max(in_ms);
    TimelineData {
        playback_range: PlaybackRange { in_ms, out_ms },
        ..timeline.clone()
    }
}

/// One subtitle line as consumed by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleCue {
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub speaker: String,
}

/// Renderer input derived from a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProps {
    pub duration_in_frames: i64,
    pub subtitle_tracks: Vec<SubtitleCue>,
}

/// Project a timeline into renderer props at `fps`.
pub fn to_render_props(timeline: &TimelineData, fps: u32) -> RenderProps {
    let range = timeline.playback_range;
    let duration_ms = range
        .out_ms
        .saturating_sub(range.in_ms)
        .max(MIN_RENDER_DURATION_MS);
    let duration_in_frames = duration_ms
        .saturating_mul(i64::from(fps))
        .saturating_add(999)
        / 1000;

    let subtitle_tracks = timeline
        .tracks
        .iter()
        .filter(|t| t.track_type == TrackType::Subtitle)
        .flat_map(|t| t.clips.iter())
        .map(|clip| SubtitleCue {
            start_ms: clip.start_ms,
            end_ms: clip.end_ms(),
            text: clip.text.clone().unwrap_or_default(),
            speaker: clip.style.clone().unwrap_or_else(|| "narrator".to_string()),
        })
        .collect();

    RenderProps {
        duration_in_frames,
        subtitle_tracks,
    }
}

/// Build the initial timeline for a script: one subtitle clip per line laid
/// end to end, under a single narration audio clip spanning the whole range.
pub fn timeline_from_script(script: &Script) -> TimelineData {
    let subtitle_path = format!(
        "output/{}/latest/subtitles.json",
        StepName::SubtitleGeneration.as_str()
    );

    let mut cursor = 0i64;
    let mut subtitle_clips = Vec::with_capacity(script.lines.len());
    for (idx, line) in script.lines.iter().enumerate() {
        let chars = line.text.chars().count() as i64;
        let duration_ms = (chars * MS_PER_CHAR).max(MIN_SUBTITLE_DURATION_MS);

        let mut clip = TimelineClip::new(
            format!("sub-{}", idx + 1),
            ArtifactType::Subtitle,
            subtitle_path.clone(),
            cursor,
            duration_ms,
        );
        clip.text = Some(line.text.clone());
        clip.style = Some(line.speaker.clone());
        subtitle_clips.push(clip);

        cursor += duration_ms;
    }

    let total = cursor.max(MIN_TIMELINE_DURATION_MS);

    let mut narration = TimelineClip::new(
        "audio-main",
        ArtifactType::Audio,
        format!("output/{}/latest/audio.wav", StepName::SpeechSynthesis.as_str()),
        0,
        total,
    );
    narration.in_ms = Some(0);
    narration.out_ms = Some(total);
    narration.volume = Some(1.0);

    TimelineData {
        playback_range: PlaybackRange {
            in_ms: 0,
            out_ms: total,
        },
        markers: vec![TimelineMarker {
            id: "mk-start".to_string(),
            time_ms: 0,
            label: "start".to_string(),
        }],
        tracks: vec![
            TimelineTrack {
                id: "track-audio".to_string(),
                name: "音声".to_string(),
                track_type: TrackType::Audio,
                clips: vec![narration],
            },
            TimelineTrack {
                id: "track-subtitle".to_string(),
                name: "字幕".to_string(),
                track_type: TrackType::Subtitle,
                clips: subtitle_clips,
            },
        ],
    }
}

/// Single edit request, as received from an editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum TimelineOperation {
    #[serde(rename_all = "camelCase")]
    Move {
        track_id: String,
        clip_id: String,
        new_start_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    Resize {
        track_id: String,
        clip_id: String,
        new_duration_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    PlaybackRange { in_ms: i64, out_ms: i64 },
}

impl TimelineOperation {
    pub fn apply(&self, timeline: &TimelineData) -> TimelineData {
        match self {
            Self::Move {
                track_id,
                clip_id,
                new_start_ms,
            } => move_clip(timeline, track_id, clip_id, *new_start_ms),
            Self::Resize {
                track_id,
                clip_id,
                new_duration_ms,
            } => resize_clip(timeline, track_id, clip_id, *new_duration_ms),
            Self::PlaybackRange { in_ms, out_ms } => {
                set_playback_range(timeline, *in_ms, *out_ms)
            }
        }
    }
}
