use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

pub const API_BASE: &str
  = "https://api.openai.com/v1";

// ===== Wire Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChatRequest<'a>
{   pub model: &'a str
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub max_tokens: u32
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChatResponse
{   pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<Usage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ResponseMessage
  , pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage
{   #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage
{   pub prompt_tokens: u64
  , pub completion_tokens: u64
}

// ===== Adapter =====

/// OpenAI chat completions adapter
pub struct OpenAiAdapter
{   settings: super::HttpSettings
  , http_client: reqwest::Client
}

impl OpenAiAdapter
{   pub fn new(
      settings: super::HttpSettings
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating OpenAiAdapter for {}", settings.api_base);
        let http_client = settings.build_client()?;
        Ok(OpenAiAdapter
        {   settings
          , http_client
        })
    }
}

#[async_trait::async_trait]
impl super::Adapter for OpenAiAdapter
{   fn provider(&self) -> crate::Provider
    {   crate::Provider::OpenAI
    }

    async fn send(
      &self
    , call: &super::ChatCall<'_>
    ) -> Result<super::ChatReply, crate::error::AdapterError>
    {   debug!("Sending OpenAI chat for model: {}", call.model);

        let request = build_request(call);
        trace!("OpenAI request: {:?}", request);

        let response = self.http_client
          .post(format!("{}/chat/completions", self.settings.api_base))
          .bearer_auth(&self.settings.api_key)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            super::transport_error(crate::Provider::OpenAI, e)
          })?;

        let body = super::read_body(crate::Provider::OpenAI, response)
          .await?;
        parse_response(&body)
    }
}

pub fn build_request<'a>(
  call: &super::ChatCall<'a>
) -> OpenAiChatRequest<'a>
{   OpenAiChatRequest
    {   model: call.model
      , messages: vec![
          ChatMessage
          {   role: "system".to_string()
            , content: call.system_prompt.to_string()
          }
        , ChatMessage
          {   role: "user".to_string()
            , content: call.user_text.to_string()
          }
        ]
      , temperature: call.temperature
      , max_tokens: call.max_output_tokens
    }
}

/// Parse a chat completions body into the first choice's text
pub fn parse_response(
  body: &str
) -> Result<super::ChatReply, crate::error::AdapterError>
{   let chat_response: OpenAiChatResponse
      = serde_json::from_str(body).map_err(|e| {
        error!("OpenAI parse error: {}", e);
        crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::OpenAI
        , format!("malformed response: {}", e)
        )
      })?;

    let usage = chat_response.usage.as_ref().map(|u| {
      crate::request::TokenUsage
      {   input_tokens: u.prompt_tokens
        , output_tokens: u.completion_tokens
      }
    });
    if let Some(usage) = &usage
    {   debug!(
          "OpenAI usage: {} in / {} out",
          usage.input_tokens, usage.output_tokens
        );
    }

    let text = chat_response.choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| {
        error!("No content in OpenAI response");
        crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::OpenAI
        , "response contained no completion text"
        )
      })?;

    Ok(super::ChatReply
    {   text
      , usage
    })
}
