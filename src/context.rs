//! Pipeline context carried explicitly by callers
//!
//! A pipeline groups the LLM calls of one logical request; each call happens
//! in a stage. The context is a plain value: callers pass it to
//! [`Instrumentor::record_call`](crate::sdk::Instrumentor::record_call), and
//! derive per-stage contexts with [`PipelineContext::with_stage`].

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    pipeline_id: String,
    stage: Option<String>,
}

impl PipelineContext {
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            stage: None,
        }
    }

    /// Context with a freshly generated pipeline id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Same pipeline, with the stage override set
    pub fn with_stage(&self, stage: impl Into<String>) -> Self {
        Self {
            pipeline_id: self.pipeline_id.clone(),
            stage: Some(stage.into()),
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }
}
