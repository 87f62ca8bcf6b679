//! Primary -> fallback retry policy for adapter calls

use serde::{Deserialize, Serialize};
use log::{debug, info, warn, error};

/// A (provider, model) pair an attempt is sent to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelTarget
{   pub provider: crate::Provider
  , pub model: String
}

impl ModelTarget
{   pub fn new(provider: crate::Provider, model: impl Into<String>) -> Self
    {   ModelTarget
        {   provider
          , model: model.into()
        }
    }
}

impl std::fmt::Display for ModelTarget
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Where a generation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState
{   Primary
  , Fallback
  , Success
  , Failed
}

/// Reply from whichever attempt succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted
{   pub reply: crate::providers::ChatReply
  , pub target: ModelTarget
  , pub fallback_applied: bool
}

/// Prompt settings that stay fixed across both attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptSpec<'a>
{   pub system_prompt: &'a str
  , pub user_text: &'a str
  , pub temperature: f32
  , pub max_output_tokens: u32
}

impl<'a> PromptSpec<'a>
{   fn call_for(&self, target: &'a ModelTarget)
      -> crate::providers::ChatCall<'a>
    {   crate::providers::ChatCall
        {   model: &target.model
          , system_prompt: self.system_prompt
          , user_text: self.user_text
          , temperature: self.temperature
          , max_output_tokens: self.max_output_tokens
        }
    }
}

/// Two-attempt policy: the resolved target, then exactly one
/// retry against the default target. No backoff between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy
{   pub default_target: ModelTarget
}

impl FallbackPolicy
{   pub fn new(default_target: ModelTarget) -> Self
    {   debug!("Fallback policy targets {}", default_target);
        FallbackPolicy
        {   default_target
        }
    }

    /// Run the primary attempt and, on adapter error, one fallback.
    pub async fn execute(
      &self
    , adapters: &crate::providers::AdapterSet
    , primary: &ModelTarget
    , prompt: &PromptSpec<'_>
    ) -> Result<Attempted, crate::error::Error>
    {   let mut state = AttemptState::Primary;
        let mut last_error: Option<crate::error::AdapterError> = None;

        loop
        { match state
          {   AttemptState::Primary => {
                debug!("Primary attempt against {}", primary);
                match attempt(adapters, primary, prompt).await
                {   Ok(reply) => {
                      return Ok(Attempted
                      {   reply
                        , target: primary.clone()
                        , fallback_applied: false
                      });
                    }
                  , Err(e) => {
                      warn!(
                        "Primary attempt on {} failed ({}): {}",
                        primary, e.kind, e.message
                      );
                      last_error = Some(e);
                      state = AttemptState::Fallback;
                    }
                }
              }
            , AttemptState::Fallback => {
                info!(
                  "Falling back from {} to {}",
                  primary, self.default_target
                );
                match attempt(adapters, &self.default_target, prompt).await
                {   Ok(reply) => {
                      state = AttemptState::Success;
                      debug!("Fallback attempt reached {:?}", state);
                      return Ok(Attempted
                      {   reply
                        , target: self.default_target.clone()
                        , fallback_applied: true
                      });
                    }
                  , Err(e) => {
                      error!(
                        "Fallback attempt on {} failed ({}): {}",
                        self.default_target, e.kind, e.message
                      );
                      last_error = Some(e);
                      state = AttemptState::Failed;
                    }
                }
              }
            , AttemptState::Success | AttemptState::Failed => break
          }
        }

        Err(match last_error
        {   Some(e) => e.into()
          , None => crate::error::Error::GenerationFailed
            {   kind: crate::error::AdapterErrorKind::Unknown
              , message: "no attempt was made".to_string()
            }
        })
    }
}

async fn attempt(
  adapters: &crate::providers::AdapterSet
, target: &ModelTarget
, prompt: &PromptSpec<'_>
) -> Result<crate::providers::ChatReply, crate::error::AdapterError>
{   let adapter = adapters.get(target.provider)?;
    adapter.send(&prompt.call_for(target)).await
}
