//! Ordered catalog of pipeline steps.
//!
//! Registry order is execution order. A step may consume the outputs of any
//! step before it, so the order is also the dependency order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WorkflowError;

/// Named pipeline step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    ThemeSelection,
    ScriptGeneration,
    TitleGeneration,
    #[serde(alias = "tts_generation")]
    SpeechSynthesis,
    CharacterSynthesis,
    BackgroundGeneration,
    BackgroundAnimation,
    SubtitleGeneration,
    VideoComposition,
    AudioEnhancement,
    IllustrationInsertion,
    FinalEncoding,
    #[serde(alias = "youtube_upload")]
    PublishUpload,
}

/// All steps, in execution order.
pub const WORKFLOW_STEPS: [StepName; 13] = [
    StepName::ThemeSelection,
    StepName::ScriptGeneration,
    StepName::TitleGeneration,
    StepName::SpeechSynthesis,
    StepName::CharacterSynthesis,
    StepName::BackgroundGeneration,
    StepName::BackgroundAnimation,
    StepName::SubtitleGeneration,
    StepName::VideoComposition,
    StepName::AudioEnhancement,
    StepName::IllustrationInsertion,
    StepName::FinalEncoding,
    StepName::PublishUpload,
];

impl StepName {
    /// Wire name of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::ThemeSelection => "theme_selection",
            StepName::ScriptGeneration => "script_generation",
            StepName::TitleGeneration => "title_generation",
            StepName::SpeechSynthesis => "speech_synthesis",
            StepName::CharacterSynthesis => "character_synthesis",
            StepName::BackgroundGeneration => "background_generation",
            StepName::BackgroundAnimation => "background_animation",
            StepName::SubtitleGeneration => "subtitle_generation",
            StepName::VideoComposition => "video_composition",
            StepName::AudioEnhancement => "audio_enhancement",
            StepName::IllustrationInsertion => "illustration_insertion",
            StepName::FinalEncoding => "final_encoding",
            StepName::PublishUpload => "publish_upload",
        }
    }

    /// Zero-based position in the registry.
    pub fn position(&self) -> usize {
        WORKFLOW_STEPS
            .iter()
            .position(|s| s == self)
            .unwrap_or(WORKFLOW_STEPS.len())
    }

    /// File whose presence under `output/<step>/latest/` proves the step
    /// already produced its output.
    pub fn signature_artifact(&self) -> Option<&'static str> {
        match self {
            StepName::ThemeSelection => Some("theme.json"),
            StepName::ScriptGeneration => Some("script.json"),
            StepName::TitleGeneration => Some("title.json"),
            StepName::SpeechSynthesis => Some("audio.wav"),
            StepName::CharacterSynthesis => Some("character_motion.json"),
            StepName::BackgroundGeneration => Some("background.png"),
            StepName::BackgroundAnimation => None,
            StepName::SubtitleGeneration => Some("subtitles.ass"),
            StepName::VideoComposition => Some("preview.mp4"),
            StepName::AudioEnhancement => Some("enhanced.wav"),
            StepName::IllustrationInsertion => Some("illustration.png"),
            StepName::FinalEncoding => Some("final.mp4"),
            StepName::PublishUpload => Some("publish_upload.json"),
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tts_generation" => return Ok(StepName::SpeechSynthesis),
            "youtube_upload" => return Ok(StepName::PublishUpload),
            _ => {}
        }
        WORKFLOW_STEPS
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownStep(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order() {
        assert_eq!(WORKFLOW_STEPS.len(), 13);
        assert_eq!(WORKFLOW_STEPS[0], StepName::ThemeSelection);
        assert_eq!(WORKFLOW_STEPS[12], StepName::PublishUpload);
        for (idx, step) in WORKFLOW_STEPS.iter().enumerate() {
            assert_eq!(step.position(), idx);
        }
    }

    #[test]
    fn test_parse_round_trip_and_aliases() {
        for step in WORKFLOW_STEPS {
            assert_eq!(step.as_str().parse::<StepName>().unwrap(), step);
        }
        assert_eq!(
            "tts_generation".parse::<StepName>().unwrap(),
            StepName::SpeechSynthesis
        );
        assert_eq!(
            "youtube_upload".parse::<StepName>().unwrap(),
            StepName::PublishUpload
        );
    }

    #[test]
    fn test_parse_unknown() {
        let err = "render_thumbnail".parse::<StepName>().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep(name) if name == "render_thumbnail"));
    }

    #[test]
    fn test_serde_aliases() {
        let step: StepName = serde_json::from_str("\"tts_generation\"").unwrap();
        assert_eq!(step, StepName::SpeechSynthesis);
        assert_eq!(
            serde_json::to_string(&StepName::PublishUpload).unwrap(),
            "\"publish_upload\""
        );
    }

    #[test]
    fn test_signature_artifacts() {
        assert_eq!(StepName::BackgroundAnimation.signature_artifact(), None);
        assert_eq!(StepName::FinalEncoding.signature_artifact(), Some("final.mp4"));
    }
}
