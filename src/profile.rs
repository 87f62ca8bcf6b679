//! Static task profile table

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use log::{debug, warn};

/// Task type used when the caller's label is not in the table
pub const DEFAULT_TASK_TYPE: &str = "business";

/// Provider, model and prompt settings for one task category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile
{   /// Hosted API serving this task
    pub provider: crate::Provider
  , /// Model identifier understood by the provider
    pub model: String
  , /// Sampling temperature, 0.0 to 1.0
    pub temperature: f32
  , /// Upper bound on generated tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32
  , /// System prompt sent ahead of the user text
    pub system_prompt: String
}

fn default_max_output_tokens() -> u32
{   1024
}

impl TaskProfile
{   /// Create a profile with the default output token limit
    pub fn new(
      provider: crate::Provider
    , model: impl Into<String>
    , temperature: f32
    , system_prompt: impl Into<String>
    ) -> Self
    {   TaskProfile
        {   provider
          , model: model.into()
          , temperature
          , max_output_tokens: default_max_output_tokens()
          , system_prompt: system_prompt.into()
        }
    }

    /// Override the output token limit
    pub fn with_max_output_tokens(mut self, max: u32) -> Self
    {   self.max_output_tokens = max;
        self
    }

    fn validate(&self, name: &str) -> Result<(), crate::error::Error>
    {   if !(0.0..=1.0).contains(&self.temperature)
        {   return Err(crate::error::Error::InvalidConfiguration(
              format!(
                "profile {}: temperature {} outside 0..=1",
                name, self.temperature
              )
            ));
        }
        if self.model.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              format!("profile {}: model is empty", name)
            ));
        }
        if self.max_output_tokens == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              format!("profile {}: max_output_tokens is 0", name)
            ));
        }
        Ok(())
    }
}

/// Immutable task type -> profile lookup.
///
/// Built once at startup and shared behind an `Arc`; lookups never
/// fail, a miss resolves to the designated default profile.
#[derive(Debug, Clone)]
pub struct ProfileTable
{   profiles: BTreeMap<String, TaskProfile>
  , default_task_type: String
  , default_profile: TaskProfile
}

impl ProfileTable
{   /// Validate and build a table
    pub fn new(
      profiles: BTreeMap<String, TaskProfile>
    , default_task_type: impl Into<String>
    ) -> Result<Self, crate::error::Error>
    {   let default_task_type
          = normalize_label(&default_task_type.into());
        let mut normalized = BTreeMap::new();
        for (name, profile) in profiles
        {   let label = normalize_label(&name);
            profile.validate(&label)?;
            if normalized.insert(label.clone(), profile).is_some()
            {   return Err(crate::error::Error::InvalidConfiguration(
                  format!("profile {} is defined more than once", label)
                ));
            }
        }
        let profiles = normalized;

        let default_profile = profiles
          .get(&default_task_type)
          .cloned()
          .ok_or_else(|| {
            crate::error::Error::InvalidConfiguration(format!(
              "default profile {} is not defined",
              default_task_type
            ))
          })?;

        debug!(
          "Profile table ready with {} profiles, default {}",
          profiles.len(), default_task_type
        );
        Ok(ProfileTable
        {   profiles
          , default_task_type
          , default_profile
        })
    }

    /// Built-in CRM profiles, default `business`
    pub fn builtin() -> Result<Self, crate::error::Error>
    {   ProfileTable::new(builtin_profiles(), DEFAULT_TASK_TYPE)
    }

    /// Resolve a task type to its profile, substituting the default
    /// profile for unknown labels.
    pub fn resolve(&self, task_type: &str) -> (&str, &TaskProfile)
    {   let label = normalize_label(task_type);
        if let Some((name, profile))
          = self.profiles.get_key_value(&label)
        {   debug!("Task type {} resolved to {}", task_type, name);
            return (name.as_str(), profile);
        }

        warn!(
          "Unknown task type {:?}, using default profile {}",
          task_type, self.default_task_type
        );
        self.default_profile()
    }

    /// The designated default profile
    pub fn default_profile(&self) -> (&str, &TaskProfile)
    {   (self.default_task_type.as_str(), &self.default_profile)
    }

    /// Lookup without default substitution
    pub fn get(&self, task_type: &str) -> Option<&TaskProfile>
    {   self.profiles.get(&normalize_label(task_type))
    }

    /// Known task type labels, sorted
    pub fn task_types(&self) -> Vec<&str>
    {   self.profiles.keys().map(String::as_str).collect()
    }

    /// Iterate over (task type, profile) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskProfile)>
    {   self.profiles.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize
    {   self.profiles.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.profiles.is_empty()
    }
}

fn normalize_label(label: &str) -> String
{   label.trim().to_lowercase()
}

/// Profiles shipped with the CRM
pub fn builtin_profiles() -> BTreeMap<String, TaskProfile>
{   let mut profiles = BTreeMap::new();

    profiles.insert(
      "creative".to_string()
    , TaskProfile::new(
        crate::Provider::Anthropic
      , "claude-3-5-sonnet-20241022"
      , 0.8
      , "You are a creative marketing copywriter for a sales CRM. \
         Write engaging, on-brand content for campaigns, social \
         posts and outreach messages. Keep the tone professional \
         and persuasive."
      ).with_max_output_tokens(2048)
    );

    profiles.insert(
      "analytical".to_string()
    , TaskProfile::new(
        crate::Provider::OpenAI
      , "gpt-4o"
      , 0.2
      , "You are a sales analytics expert. Analyse the supplied \
         CRM data and respond with JSON containing \"insights\", \
         \"recommendations\" and \"next_steps\" arrays."
      ).with_max_output_tokens(1500)
    );

    profiles.insert(
      "conversational".to_string()
    , TaskProfile::new(
        crate::Provider::Google
      , "gemini-1.5-flash"
      , 0.7
      , "You are a friendly CRM assistant helping sales staff \
         with leads, tasks and follow-ups. Answer briefly and \
         clearly."
      )
    );

    profiles.insert(
      DEFAULT_TASK_TYPE.to_string()
    , TaskProfile::new(
        crate::Provider::OpenAI
      , "gpt-4o-mini"
      , 0.5
      , "You are a business assistant for a sales CRM. Give \
         practical, concise answers about leads, pipeline and \
         customer communication."
      )
    );

    profiles
}
