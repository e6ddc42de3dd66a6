//! Stage registry
//!
//! The ordered list of stages a run is built from. Order is the execution
//! order; the tracker never reorders or skips entries.

use std::collections::HashSet;
use std::time::Duration;

use crate::domain::stage::StageDefinition;
use crate::error::{CoreError, Result};

pub const SPEECH_TO_TEXT: &str = "speech-to-text";
pub const CONTENT_UNDERSTANDING: &str = "content-understanding";
pub const EXPRESSION_ANALYSIS: &str = "expression-analysis";
pub const CLIP_GENERATION: &str = "clip-generation";

/// Ordered, validated collection of stage definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
}

impl StageRegistry {
    /// Creates a registry from definitions in execution order
    ///
    /// Fails if the list is empty or contains a duplicate id.
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self> {
        if stages.is_empty() {
            return Err(CoreError::EmptyPipeline);
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.id.as_str()) {
                return Err(CoreError::DuplicateStage(stage.id.clone()));
            }
        }

        Ok(Self { stages })
    }

    /// The four-stage clip pipeline
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![
                StageDefinition::new(
                    SPEECH_TO_TEXT,
                    "Speech to text",
                    "Extract a transcript from the audio track",
                    Duration::from_secs(2 * 60),
                ),
                StageDefinition::new(
                    CONTENT_UNDERSTANDING,
                    "Content understanding",
                    "Analyse context and main topics of the transcript",
                    Duration::from_secs(3 * 60),
                ),
                StageDefinition::new(
                    EXPRESSION_ANALYSIS,
                    "Expression analysis",
                    "Detect facial expressions, gestures and pacing",
                    Duration::from_secs(5 * 60),
                ),
                StageDefinition::new(
                    CLIP_GENERATION,
                    "Clip generation",
                    "Cut short clips from the detected highlights",
                    Duration::from_secs(4 * 60),
                ),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StageDefinition> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sum of all estimated stage durations
    pub fn estimated_total(&self) -> Duration {
        self.stages.iter().map(|s| s.estimated_duration).sum()
    }

    pub fn into_definitions(self) -> Vec<StageDefinition> {
        self.stages
    }
}

impl<'a> IntoIterator for &'a StageRegistry {
    type Item = &'a StageDefinition;
    type IntoIter = std::slice::Iter<'a, StageDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> StageDefinition {
        StageDefinition::new(id, id, "", Duration::from_secs(60))
    }

    #[test]
    fn test_default_pipeline_order() {
        let registry = StageRegistry::default_pipeline();
        let ids: Vec<&str> = registry.iter().map(|s| s.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                SPEECH_TO_TEXT,
                CONTENT_UNDERSTANDING,
                EXPRESSION_ANALYSIS,
                CLIP_GENERATION
            ]
        );
        assert_eq!(registry.estimated_total(), Duration::from_secs(14 * 60));
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert_eq!(
            StageRegistry::new(Vec::new()).unwrap_err(),
            CoreError::EmptyPipeline
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = StageRegistry::new(vec![def("a"), def("b"), def("a")]).unwrap_err();
        assert_eq!(err, CoreError::DuplicateStage("a".to_string()));
    }

    #[test]
    fn test_lookup() {
        let registry = StageRegistry::new(vec![def("transcode"), def("publish")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("publish").is_some());
        assert!(registry.get("missing").is_none());
    }
}
