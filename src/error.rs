//! Error types for taskllm and the adapter error classifier

use log::trace;
use serde::{Deserialize, Serialize};

/// Coarse category of a failed provider call.
///
/// Derived from vendor error text by [`classify_error`], so it is
/// a best guess and never exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterErrorKind
{   /// Account or rate quota exhausted
    Quota
  , /// API key rejected by the provider
    InvalidKey
  , /// Request used a parameter the model does not accept
    UnsupportedParameter
  , /// Transport failure (connect, timeout, reset)
    Network
  , /// Anything the classifier did not recognise
    Unknown
}

impl std::fmt::Display for AdapterErrorKind
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   let name = match self
        {   AdapterErrorKind::Quota => "quota"
          , AdapterErrorKind::InvalidKey => "invalid_key"
          , AdapterErrorKind::UnsupportedParameter => {
              "unsupported_parameter"
            }
          , AdapterErrorKind::Network => "network"
          , AdapterErrorKind::Unknown => "unknown"
        };
        f.write_str(name)
    }
}

/// Failure of a single outbound call made by an adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider} adapter error ({kind}): {message}")]
pub struct AdapterError
{   pub kind: AdapterErrorKind
  , pub provider: crate::Provider
  , pub message: String
}

impl AdapterError
{   /// Build an error whose kind is classified from the message
    pub fn classified(
      provider: crate::Provider
    , message: impl Into<String>
    ) -> Self
    {   let message = message.into();
        let kind = classify_error(&message);
        AdapterError
        {   kind
          , provider
          , message
        }
    }

    /// Build an error with an explicit kind
    pub fn new(
      kind: AdapterErrorKind
    , provider: crate::Provider
    , message: impl Into<String>
    ) -> Self
    {   AdapterError
        {   kind
          , provider
          , message: message.into()
        }
    }
}

/// Errors surfaced to callers of the router
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error
{   /// Primary and fallback attempts both failed
    #[error("generation failed ({kind}): {message}")]
    GenerationFailed
    {   kind: AdapterErrorKind
      , message: String
    }
  , /// The prompt text was empty or whitespace only
    #[error("prompt text must not be empty")]
    EmptyPrompt
  , /// Configuration values are inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String)
  , /// The environment variable holding an API key is not set
    #[error("missing API key: env var {0} not set")]
    MissingApiKey(String)
  , /// A configuration file could not be read or parsed
    #[error("config load failed: {0}")]
    Config(String)
  , /// The HTTP client could not be constructed
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String)
}

impl Error
{   /// Adapter error kind behind a terminal generation failure
    pub fn adapter_kind(&self) -> Option<AdapterErrorKind>
    {   match self
        {   Error::GenerationFailed { kind, .. } => Some(*kind)
          , _ => None
        }
    }
}

impl From<AdapterError> for Error
{   fn from(err: AdapterError) -> Self
    {   Error::GenerationFailed
        {   kind: err.kind
          , message: err.to_string()
        }
    }
}

/// Classify vendor error text into an [`AdapterErrorKind`].
///
/// Plain case-insensitive substring matching over whatever the
/// provider put in its error body. First match wins:
/// quota, invalid key, unsupported parameter, network, unknown.
pub fn classify_error(message: &str) -> AdapterErrorKind
{   let text = message.to_lowercase();
    let kind = if text.contains("quota")
    {   AdapterErrorKind::Quota
    } else if text.contains("invalid") && text.contains("key")
    {   AdapterErrorKind::InvalidKey
    } else if text.contains("parameter")
      || text.contains("unsupported")
    {   AdapterErrorKind::UnsupportedParameter
    } else if text.contains("timeout")
      || text.contains("timed out")
      || text.contains("connection")
      || text.contains("network")
    {   AdapterErrorKind::Network
    } else
    {   AdapterErrorKind::Unknown
    };
    trace!("Classified error text as {}", kind);
    kind
}
