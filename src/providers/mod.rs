//! Provider adapters: one outbound chat call per `send`

pub mod openai;
pub mod anthropic;
pub mod gemini;

// Re-export for convenience
pub use openai::OpenAiAdapter;
pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, warn};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Everything an adapter needs for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatCall<'a>
{   pub model: &'a str
  , pub system_prompt: &'a str
  , pub user_text: &'a str
  , pub temperature: f32
  , pub max_output_tokens: u32
}

/// Completion text plus whatever usage the provider reported
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply
{   pub text: String
  , pub usage: Option<crate::request::TokenUsage>
}

/// A single hosted chat-completion API.
///
/// Implementations hold only immutable settings and perform no
/// retries; the fallback policy sits one layer up.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync
{   /// Provider served by this adapter
    fn provider(&self) -> crate::Provider;

    /// Perform one completion call.
    async fn send(
      &self
    , call: &ChatCall<'_>
    ) -> Result<ChatReply, crate::error::AdapterError>;
}

/// Connection settings shared by the HTTP adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings
{   pub api_key: String
  , pub api_base: String
  , pub request_timeout: Duration
  , pub connect_timeout: Duration
}

impl HttpSettings
{   /// Settings against the provider's public endpoint
    pub fn new(
      provider: crate::Provider
    , api_key: impl Into<String>
    ) -> Self
    {   HttpSettings
        {   api_key: api_key.into()
          , api_base: provider.default_api_base().to_string()
          , request_timeout: Duration::from_secs(
              DEFAULT_REQUEST_TIMEOUT_SECS
            )
          , connect_timeout: Duration::from_secs(
              DEFAULT_CONNECT_TIMEOUT_SECS
            )
        }
    }

    /// Point at a different base URL (proxy, mock server)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self
    {   self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeouts(
      mut self
    , request: Duration
    , connect: Duration
    ) -> Self
    {   self.request_timeout = request;
        self.connect_timeout = connect;
        self
    }

    fn build_client(&self)
      -> Result<reqwest::Client, crate::error::Error>
    {   reqwest::Client::builder()
          .timeout(self.request_timeout)
          .connect_timeout(self.connect_timeout)
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            crate::error::Error::HttpClientBuild(e.to_string())
          })
    }
}

/// Map a transport level reqwest failure onto an adapter error
pub(crate) fn transport_error(
  provider: crate::Provider
, err: reqwest::Error
) -> crate::error::AdapterError
{   error!("{} HTTP error: {}", provider, err);
    if err.is_timeout() || err.is_connect()
    {   crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Network
        , provider
        , err.to_string()
        )
    } else
    {   crate::error::AdapterError::classified(provider, err.to_string())
    }
}

/// Read a response body, turning non-2xx statuses into classified
/// adapter errors
pub(crate) async fn read_body(
  provider: crate::Provider
, response: reqwest::Response
) -> Result<String, crate::error::AdapterError>
{   let status = response.status();
    log::trace!("{} response status: {}", provider, status);

    let body = response.text().await
      .map_err(|e| transport_error(provider, e))?;

    if !status.is_success()
    {   error!("{} API error {}: {}", provider, status, body);
        return Err(crate::error::AdapterError::classified(
          provider
        , format!("status {}: {}", status.as_u16(), body)
        ));
    }

    Ok(body)
}

/// Immutable provider -> adapter registry
#[derive(Clone, Default)]
pub struct AdapterSet
{   adapters: HashMap<crate::Provider, Arc<dyn Adapter>>
}

impl AdapterSet
{   pub fn new() -> Self
    {   AdapterSet::default()
    }

    /// Register an adapter under its own provider
    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self
    {   let provider = adapter.provider();
        debug!("Registering adapter for {}", provider);
        if self.adapters.insert(provider, adapter).is_some()
        {   warn!("Replaced existing adapter for {}", provider);
        }
        self
    }

    /// Build HTTP adapters for every configured provider whose API
    /// key is present in the environment. Providers without a key are
    /// skipped; calls routed to them fail with an invalid key error.
    pub fn from_config(
      config: &crate::config::RouterConfig
    ) -> Result<Self, crate::error::Error>
    {   let mut set = AdapterSet::new();
        for provider_config in &config.providers
        {   let provider = provider_config.provider;
            let api_key = match provider_config.resolve_api_key()
            {   Ok(key) => key
              , Err(e) => {
                  warn!("Skipping {} adapter: {}", provider, e);
                  continue;
                }
            };
            let settings = provider_config.http_settings(api_key);
            let adapter: Arc<dyn Adapter> = match provider
            {   crate::Provider::OpenAI => {
                  Arc::new(OpenAiAdapter::new(settings)?)
                }
              , crate::Provider::Anthropic => {
                  Arc::new(AnthropicAdapter::new(settings)?)
                }
              , crate::Provider::Google => {
                  Arc::new(GeminiAdapter::new(settings)?)
                }
            };
            set = set.with_adapter(adapter);
        }
        debug!("Adapter set built with {} adapters", set.len());
        Ok(set)
    }

    /// Adapter for a provider, or an invalid key error when none is
    /// configured
    pub fn get(
      &self
    , provider: crate::Provider
    ) -> Result<&Arc<dyn Adapter>, crate::error::AdapterError>
    {   self.adapters.get(&provider).ok_or_else(|| {
          error!("No adapter configured for {}", provider);
          crate::error::AdapterError::new(
            crate::error::AdapterErrorKind::InvalidKey
          , provider
          , format!("no API key configured for {}", provider)
          )
        })
    }

    pub fn contains(&self, provider: crate::Provider) -> bool
    {   self.adapters.contains_key(&provider)
    }

    pub fn providers(&self) -> Vec<crate::Provider>
    {   let mut providers: Vec<crate::Provider>
          = self.adapters.keys().copied().collect();
        providers.sort();
        providers
    }

    pub fn len(&self) -> usize
    {   self.adapters.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   f.debug_struct("AdapterSet")
          .field("providers", &self.providers())
          .finish()
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::error::AdapterErrorKind;

    fn call() -> ChatCall<'static>
    {   ChatCall
        {   model: "gpt-4o-mini"
          , system_prompt: "Be brief."
          , user_text: "ping"
          , temperature: 0.0
          , max_output_tokens: 8
        }
    }

    #[tokio::test]
    async fn refused_connection_is_network()
    {   // nothing listens on port 1
        let adapter = OpenAiAdapter::new(
          HttpSettings::new(crate::Provider::OpenAI, "sk-test")
            .with_api_base("http://127.0.0.1:1")
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(2))
        ).unwrap();

        let err = adapter.send(&call()).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Network);
        assert_eq!(err.provider, crate::Provider::OpenAI);
    }

    #[tokio::test]
    async fn silent_server_times_out_as_network()
    {   // accepted by the OS backlog, never answered
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
          .await
          .unwrap();
        let addr = listener.local_addr().unwrap();

        let adapter = AnthropicAdapter::new(
          HttpSettings::new(crate::Provider::Anthropic, "ak-test")
            .with_api_base(format!("http://{}", addr))
            .with_timeouts(
              Duration::from_millis(200)
            , Duration::from_millis(200)
            )
        ).unwrap();

        let err = adapter.send(&call()).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Network);
        drop(listener);
    }

    #[test]
    fn missing_adapter_is_invalid_key()
    {   let set = AdapterSet::new();
        let err = set.get(crate::Provider::Google).err().unwrap();
        assert_eq!(err.kind, AdapterErrorKind::InvalidKey);
    }
}
