pub mod error;
pub mod config;
pub mod profile;
pub mod providers;
pub mod request;
pub mod normalize;
pub mod failover;
pub mod router;

use serde::{Deserialize, Serialize};

/*

taskllm routes CRM content/analysis requests to one of a few hosted
chat-completion APIs, picked per task type from a static profile
table, with a single fallback attempt and best-effort structuring
of the free-text reply.

taskllm/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Provider enum and re-exports
│   ├── main.rs         # One-shot command line front end
│   ├── error.rs        # Error types and the error text classifier
│   ├── config.rs       # RouterConfig / ProviderConfig loading
│   ├── profile.rs      # TaskProfile table and default resolution
│   ├── providers/      # One adapter per hosted API
│   │   ├── mod.rs      # Adapter trait and AdapterSet
│   │   ├── openai.rs
│   │   ├── anthropic.rs
│   │   └── gemini.rs
│   ├── request.rs      # GenerationRequest / GenerationResult
│   ├── normalize.rs    # Free text -> structured value, never fails
│   ├── failover.rs     # Primary -> fallback two attempt policy
│   └── router.rs       # TaskRouter, the generate entry point
└── tests/              # Router level tests with mock adapters

*/

pub use error::{AdapterError, AdapterErrorKind, Error};
pub use config::{ProviderConfig, RouterConfig};
pub use profile::{ProfileTable, TaskProfile};
pub use providers::{Adapter, AdapterSet, ChatCall, ChatReply};
pub use request::{GenerationRequest, GenerationResult, TokenUsage};
pub use normalize::{normalize, Normalized, Section, ShapeHint};
pub use failover::{FallbackPolicy, ModelTarget};
pub use router::TaskRouter;

/// Hosted chat-completion APIs the router can dispatch to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
, Deserialize, Serialize
)]
#[serde(rename_all = "lowercase")]
pub enum Provider
{   /// OpenAI chat completions (GPT-4o family)
    #[serde(rename = "openai")]
    OpenAI
  , /// Anthropic messages API (Claude models)
    Anthropic
  , /// Google Gemini generateContent API
    #[serde(alias = "gemini")]
    Google
}

impl Provider
{   /// Every supported provider, in dispatch order
    pub const ALL: [Provider; 3] = [
      Provider::OpenAI
    , Provider::Anthropic
    , Provider::Google
    ];

    /// Lowercase identifier used in config files and logs
    pub fn as_str(&self) -> &'static str
    {   match self
        {   Provider::OpenAI => "openai"
          , Provider::Anthropic => "anthropic"
          , Provider::Google => "google"
        }
    }

    /// Environment variable conventionally holding the API key
    pub fn default_api_key_env(&self) -> &'static str
    {   match self
        {   Provider::OpenAI => "OPENAI_API_KEY"
          , Provider::Anthropic => "ANTHROPIC_API_KEY"
          , Provider::Google => "GEMINI_API_KEY"
        }
    }

    /// Public API base URL
    pub fn default_api_base(&self) -> &'static str
    {   match self
        {   Provider::OpenAI => providers::openai::API_BASE
          , Provider::Anthropic => providers::anthropic::API_BASE
          , Provider::Google => providers::gemini::API_BASE
        }
    }
}

impl std::fmt::Display for Provider
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   f.pad(self.as_str())
    }
}

impl std::str::FromStr for Provider
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   match s.trim().to_lowercase().as_str()
        {   "openai" => Ok(Provider::OpenAI)
          , "anthropic" => Ok(Provider::Anthropic)
          , "google" | "gemini" => Ok(Provider::Google)
          , other => Err(Error::InvalidConfiguration(
              format!("unknown provider: {}", other)
            ))
        }
    }
}
