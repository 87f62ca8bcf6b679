//! Configuration for taskllm providers, profiles and fallback

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::{debug, info};

/// Names a JSON config file to load instead of the built-ins
pub const CONFIG_PATH_ENV: &str = "TASKLLM_CONFIG";
pub const DEFAULT_PROFILE_ENV: &str = "TASKLLM_DEFAULT_PROFILE";
pub const FALLBACK_PROVIDER_ENV: &str = "TASKLLM_FALLBACK_PROVIDER";
pub const FALLBACK_MODEL_ENV: &str = "TASKLLM_FALLBACK_MODEL";

/// Per provider connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig
{   /// Which provider this configures
    pub provider: crate::Provider
  , /// Env var holding the API key (provider default if absent)
    #[serde(default)]
    pub api_key_env: Option<String>
  , /// API base URL (if custom)
    #[serde(default)]
    pub api_base: Option<String>
  , /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>
  , /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>
}

impl ProviderConfig
{   pub fn new(provider: crate::Provider) -> Self
    {   ProviderConfig
        {   provider
          , api_key_env: None
          , api_base: None
          , timeout_secs: None
          , connect_timeout_secs: None
        }
    }

    /// Env var name the key is read from
    pub fn api_key_var(&self) -> &str
    {   self.api_key_env
          .as_deref()
          .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Read the API key from the environment
    pub fn resolve_api_key(&self) -> Result<String, crate::error::Error>
    {   let var = self.api_key_var();
        match std::env::var(var)
        {   Ok(key) if !key.trim().is_empty() => Ok(key)
          , _ => Err(crate::error::Error::MissingApiKey(var.to_string()))
        }
    }

    /// HTTP settings for an adapter, given its API key
    pub fn http_settings(
      &self
    , api_key: String
    ) -> crate::providers::HttpSettings
    {   let mut settings
          = crate::providers::HttpSettings::new(self.provider, api_key);
        if let Some(base) = &self.api_base
        {   settings = settings.with_api_base(base.as_str());
        }
        settings.with_timeouts(
          Duration::from_secs(self.timeout_secs.unwrap_or(
            crate::providers::DEFAULT_REQUEST_TIMEOUT_SECS
          ))
        , Duration::from_secs(self.connect_timeout_secs.unwrap_or(
            crate::providers::DEFAULT_CONNECT_TIMEOUT_SECS
          ))
        )
    }
}

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig
{   /// Task type -> profile
    #[serde(default = "crate::profile::builtin_profiles")]
    pub profiles: BTreeMap<String, crate::profile::TaskProfile>
  , /// Profile used for unknown task types
    #[serde(default = "default_profile_name")]
    pub default_profile: String
  , /// Target of the single fallback attempt
    #[serde(default = "default_fallback")]
    pub fallback: crate::failover::ModelTarget
  , /// Provider connection settings
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>
}

fn default_profile_name() -> String
{   crate::profile::DEFAULT_TASK_TYPE.to_string()
}

fn default_fallback() -> crate::failover::ModelTarget
{   crate::failover::ModelTarget::new(crate::Provider::OpenAI, "gpt-4o-mini")
}

fn default_providers() -> Vec<ProviderConfig>
{   crate::Provider::ALL
      .iter()
      .map(|p| ProviderConfig::new(*p))
      .collect()
}

impl Default for RouterConfig
{   fn default() -> Self
    {   RouterConfig
        {   profiles: crate::profile::builtin_profiles()
          , default_profile: default_profile_name()
          , fallback: default_fallback()
          , providers: default_providers()
        }
    }
}

impl RouterConfig
{   /// Parse a JSON document; missing sections take defaults
    pub fn from_json_str(json: &str) -> Result<Self, crate::error::Error>
    {   let config: RouterConfig = serde_json::from_str(json)
          .map_err(|e| crate::error::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>)
      -> Result<Self, crate::error::Error>
    {   let path = path.as_ref();
        debug!("Loading router config from {}", path.display());
        let json = std::fs::read_to_string(path).map_err(|e| {
          crate::error::Error::Config(
            format!("{}: {}", path.display(), e)
          )
        })?;
        Self::from_json_str(&json)
    }

    /// Build config from the environment.
    ///
    /// - `TASKLLM_CONFIG`: JSON file path, built-ins when unset
    /// - `TASKLLM_DEFAULT_PROFILE`: overrides `default_profile`
    /// - `TASKLLM_FALLBACK_PROVIDER` / `TASKLLM_FALLBACK_MODEL`:
    ///   override the fallback target
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   let mut config = match std::env::var(CONFIG_PATH_ENV)
        {   Ok(path) => Self::from_file(path)?
          , Err(_) => {
              info!("{} not set, using built-in profiles", CONFIG_PATH_ENV);
              RouterConfig::default()
            }
        };

        if let Ok(name) = std::env::var(DEFAULT_PROFILE_ENV)
        {   config.default_profile = name;
        }
        if let Ok(provider) = std::env::var(FALLBACK_PROVIDER_ENV)
        {   config.fallback.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var(FALLBACK_MODEL_ENV)
        {   config.fallback.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the profile table and fallback target
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   self.profile_table()?;
        if self.fallback.model.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "fallback model is empty".to_string()
            ));
        }
        Ok(())
    }

    /// Validated, immutable profile table
    pub fn profile_table(&self)
      -> Result<crate::profile::ProfileTable, crate::error::Error>
    {   crate::profile::ProfileTable::new(
          self.profiles.clone()
        , self.default_profile.clone()
        )
    }

    pub fn fallback_policy(&self) -> crate::failover::FallbackPolicy
    {   crate::failover::FallbackPolicy::new(self.fallback.clone())
    }
}
