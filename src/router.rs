use std::sync::Arc;
use serde_json::Value;
use log::{debug, info, error};

/// Routes generation requests to the provider configured for their
/// task type.
///
/// Holds only immutable state (profile table, adapters, fallback
/// policy) so one router can be cloned into every request handler.
/// Each call is independent; dropping the returned future abandons
/// whichever attempt is in flight.
#[derive(Debug, Clone)]
pub struct TaskRouter
{   profiles: Arc<crate::profile::ProfileTable>
  , adapters: crate::providers::AdapterSet
  , policy: crate::failover::FallbackPolicy
}

impl TaskRouter
{   /// Create a router from already built parts
    pub fn new(
      profiles: Arc<crate::profile::ProfileTable>
    , adapters: crate::providers::AdapterSet
    , policy: crate::failover::FallbackPolicy
    ) -> Self
    {   debug!(
          "Creating TaskRouter: {} profiles, adapters {:?}",
          profiles.len(), adapters.providers()
        );
        TaskRouter
        {   profiles
          , adapters
          , policy
        }
    }

    /// Create a router with HTTP adapters from a config
    pub fn from_config(
      config: &crate::config::RouterConfig
    ) -> Result<Self, crate::error::Error>
    {   let profiles = Arc::new(config.profile_table()?);
        let adapters = crate::providers::AdapterSet::from_config(config)?;
        Ok(TaskRouter::new(profiles, adapters, config.fallback_policy()))
    }

    pub fn profiles(&self) -> &crate::profile::ProfileTable
    {   &self.profiles
    }

    pub fn policy(&self) -> &crate::failover::FallbackPolicy
    {   &self.policy
    }

    /// Profile a task type resolves to; unknown labels get the default
    pub fn resolve(&self, task_type: &str)
      -> (&str, &crate::profile::TaskProfile)
    {   self.profiles.resolve(task_type)
    }

    /// Generate free text for a task type
    pub async fn route(
      &self
    , task_type: &str
    , prompt_text: &str
    , context_payload: Option<&Value>
    ) -> Result<crate::request::GenerationResult, crate::error::Error>
    {   let mut request
          = crate::request::GenerationRequest::new(task_type, prompt_text);
        request.context_payload = context_payload.cloned();
        self.generate(request).await
    }

    /// Resolve the profile, call the provider (with one fallback),
    /// and normalize the reply into the requested shape.
    pub async fn generate(
      &self
    , request: crate::request::GenerationRequest
    ) -> Result<crate::request::GenerationResult, crate::error::Error>
    {   if request.prompt_text.trim().is_empty()
        {   error!("Rejecting generation with empty prompt");
            return Err(crate::error::Error::EmptyPrompt);
        }

        let (task_type, profile) = self.profiles.resolve(&request.task_type);
        debug!(
          "Generating {} (session {:?}) via {}/{}",
          task_type, request.session_id, profile.provider, profile.model
        );

        let user_text = build_user_text(
          request.context_payload.as_ref()
        , &request.prompt_text
        );
        let primary = crate::failover::ModelTarget::new(
          profile.provider
        , profile.model.clone()
        );
        let prompt = crate::failover::PromptSpec
        {   system_prompt: &profile.system_prompt
          , user_text: &user_text
          , temperature: profile.temperature
          , max_output_tokens: profile.max_output_tokens
        };

        let attempted = self.policy
          .execute(&self.adapters, &primary, &prompt)
          .await?;

        let normalized = crate::normalize::normalize(
          &attempted.reply.text
        , &request.expected_shape
        );
        let (structured, degraded) = match normalized
        {   crate::normalize::Normalized::Structured(v) => (Some(v), None)
          , crate::normalize::Normalized::Fallback(v) => (None, Some(v))
        };

        info!(
          "Generated {} via {} (fallback: {}, structured: {})",
          task_type, attempted.target, attempted.fallback_applied,
          structured.is_some()
        );

        Ok(crate::request::GenerationResult
        {   raw_text: attempted.reply.text
          , structured
          , degraded
          , provider_used: attempted.target.provider
          , model_used: attempted.target.model
          , fallback_applied: attempted.fallback_applied
          , task_type: task_type.to_string()
          , session_id: request.session_id
          , usage: attempted.reply.usage
        })
    }
}

/// User message: rendered context (if any) followed by the prompt.
/// The profile's system prompt travels separately as the system
/// message, ahead of both.
pub fn build_user_text(context: Option<&Value>, prompt_text: &str) -> String
{   match context
    {   None | Some(Value::Null) => prompt_text.to_string()
      , Some(context) => {
          let rendered = serde_json::to_string_pretty(context)
            .unwrap_or_else(|_| context.to_string());
          format!("Context:\n{}\n\n{}", rendered, prompt_text)
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn prompt_without_context_is_unchanged()
    {   assert_eq!(build_user_text(None, "Draft an email"), "Draft an email");
        assert_eq!(
          build_user_text(Some(&Value::Null), "Draft an email")
        , "Draft an email"
        );
    }

    #[test]
    fn context_precedes_prompt()
    {   let context = json!({"lead": "Acme", "stage": "demo"});
        let text = build_user_text(Some(&context), "Suggest a next step");
        assert!(text.starts_with("Context:\n{"));
        assert!(text.contains("\"lead\": \"Acme\""));
        assert!(text.ends_with("\n\nSuggest a next step"));
    }
}
