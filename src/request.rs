//! Generation request and result types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A caller's ask to the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest
{   /// Task category; unknown labels use the default profile
    pub task_type: String
  , /// The prompt text, must not be blank
    pub prompt_text: String
  , /// Optional structured data rendered into the prompt
    #[serde(default)]
    pub context_payload: Option<Value>
  , /// Groups conversational turns, passed through untouched
    #[serde(default)]
    pub session_id: Option<String>
  , /// Shape the normalizer should aim for
    #[serde(default)]
    pub expected_shape: crate::normalize::ShapeHint
}

impl GenerationRequest
{   pub fn new(
      task_type: impl Into<String>
    , prompt_text: impl Into<String>
    ) -> Self
    {   GenerationRequest
        {   task_type: task_type.into()
          , prompt_text: prompt_text.into()
          , context_payload: None
          , session_id: None
          , expected_shape: crate::normalize::ShapeHint::default()
        }
    }

    pub fn with_context(mut self, context: Value) -> Self
    {   self.context_payload = Some(context);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self
    {   self.session_id = Some(session_id.into());
        self
    }

    pub fn with_shape(
      mut self
    , shape: crate::normalize::ShapeHint
    ) -> Self
    {   self.expected_shape = shape;
        self
    }
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage
{   pub input_tokens: u64
  , pub output_tokens: u64
}

/// Outcome of a successful generation.
///
/// `raw_text` is always the provider's verbatim reply. `structured`
/// is only set when the reply parsed into the expected shape;
/// otherwise `degraded` holds the heuristic fallback value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult
{   pub raw_text: String
  , pub structured: Option<Value>
  , pub degraded: Option<Value>
  , pub provider_used: crate::Provider
  , pub model_used: String
  , pub fallback_applied: bool
  , /// Profile the task type resolved to
    pub task_type: String
  , pub session_id: Option<String>
  , pub usage: Option<TokenUsage>
}

impl GenerationResult
{   /// Best usable value: parsed structure, else the degraded
    /// fallback, else `{content, formatted: false}`
    pub fn payload(&self) -> Value
    {   if let Some(structured) = &self.structured
        {   return structured.clone();
        }
        if let Some(degraded) = &self.degraded
        {   return degraded.clone();
        }
        crate::normalize::fallback_object(&self.raw_text)
    }

    pub fn is_structured(&self) -> bool
    {   self.structured.is_some()
    }
}
