use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

pub const API_BASE: &str
  = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

// ===== Wire Types =====

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage<'a>
{   pub role: &'a str
  , pub content: &'a str
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest<'a>
{   pub model: &'a str
  , pub max_tokens: u32
  , pub temperature: f32
  , #[serde(skip_serializing_if = "is_blank")]
    pub system: &'a str
  , pub messages: Vec<AnthropicMessage<'a>>
}

fn is_blank(system: &&str) -> bool
{   system.trim().is_empty()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse
{   pub content: Vec<ContentBlock>
  , #[serde(default)]
    pub stop_reason: Option<String>
  , #[serde(default)]
    pub usage: Option<Usage>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock
{   #[serde(rename = "text")]
    Text { text: String }
  , #[serde(other)]
    Other
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage
{   pub input_tokens: u64
  , pub output_tokens: u64
}

// ===== Adapter =====

/// Anthropic messages API adapter
pub struct AnthropicAdapter
{   settings: super::HttpSettings
  , http_client: reqwest::Client
}

impl AnthropicAdapter
{   pub fn new(
      settings: super::HttpSettings
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating AnthropicAdapter for {}", settings.api_base);
        let http_client = settings.build_client()?;
        Ok(AnthropicAdapter
        {   settings
          , http_client
        })
    }
}

#[async_trait::async_trait]
impl super::Adapter for AnthropicAdapter
{   fn provider(&self) -> crate::Provider
    {   crate::Provider::Anthropic
    }

    async fn send(
      &self
    , call: &super::ChatCall<'_>
    ) -> Result<super::ChatReply, crate::error::AdapterError>
    {   debug!("Sending Anthropic message for model: {}", call.model);

        let request = AnthropicRequest
        {   model: call.model
          , max_tokens: call.max_output_tokens
          , temperature: call.temperature
          , system: call.system_prompt
          , messages: vec![
              AnthropicMessage
              {   role: "user"
                , content: call.user_text
              }
            ]
        };
        trace!("Anthropic request: {:?}", request);

        let response = self.http_client
          .post(format!("{}/messages", self.settings.api_base))
          .header("x-api-key", &self.settings.api_key)
          .header("anthropic-version", API_VERSION)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            super::transport_error(crate::Provider::Anthropic, e)
          })?;

        let body = super::read_body(crate::Provider::Anthropic, response)
          .await?;
        parse_response(&body)
    }
}

/// Parse a messages API body, joining all text blocks
pub fn parse_response(
  body: &str
) -> Result<super::ChatReply, crate::error::AdapterError>
{   let api: AnthropicResponse
      = serde_json::from_str(body).map_err(|e| {
        error!("Anthropic parse error: {}", e);
        crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::Anthropic
        , format!("malformed response: {}", e)
        )
      })?;

    let usage = api.usage.as_ref().map(|u| {
      crate::request::TokenUsage
      {   input_tokens: u.input_tokens
        , output_tokens: u.output_tokens
      }
    });
    if let Some(usage) = &usage
    {   debug!(
          "Anthropic usage: {} in / {} out (stop: {:?})",
          usage.input_tokens, usage.output_tokens, api.stop_reason
        );
    }

    let text: Vec<String> = api.content
      .into_iter()
      .filter_map(|block| match block
      {   ContentBlock::Text { text } => Some(text)
        , ContentBlock::Other => None
      })
      .collect();
    let text = text.join("");

    if text.trim().is_empty()
    {   error!("No text blocks in Anthropic response");
        return Err(crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::Anthropic
        , "response contained no completion text"
        ));
    }

    Ok(super::ChatReply
    {   text
      , usage
    })
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::providers::{Adapter, ChatCall, HttpSettings};
    use crate::error::AdapterErrorKind;

    #[test]
    fn joins_text_blocks_and_skips_others()
    {   let reply = parse_response(
          r#"{"content":[{"type":"thinking","thinking":"hmm"},
                         {"type":"text","text":"Hello "},
                         {"type":"text","text":"world"}],
              "stop_reason":"end_turn",
              "usage":{"input_tokens":9,"output_tokens":2}}"#
        ).unwrap();
        assert_eq!(reply.text, "Hello world");
        assert_eq!(reply.usage.unwrap().output_tokens, 2);
    }

    #[test]
    fn no_text_is_an_error()
    {   let err = parse_response(r#"{"content":[]}"#).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Unknown);
    }

    #[tokio::test]
    async fn send_uses_anthropic_headers()
    {   let mut server = mockito::Server::new_async().await;
        let mock = server
          .mock("POST", "/messages")
          .match_header("x-api-key", "ak-test")
          .match_header("anthropic-version", API_VERSION)
          .with_status(200)
          .with_body(r#"{"content":[{"type":"text","text":"Draft ready"}]}"#)
          .create_async()
          .await;

        let adapter = AnthropicAdapter::new(
          HttpSettings::new(crate::Provider::Anthropic, "ak-test")
            .with_api_base(server.url())
        ).unwrap();

        let reply = adapter
          .send(&ChatCall
          {   model: "claude-3-5-sonnet-20241022"
            , system_prompt: "Write copy."
            , user_text: "Newsletter intro"
            , temperature: 0.8
            , max_output_tokens: 256
          })
          .await
          .unwrap();
        assert_eq!(reply.text, "Draft ready");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bad_key_status_is_classified()
    {   let mut server = mockito::Server::new_async().await;
        let _mock = server
          .mock("POST", "/messages")
          .with_status(401)
          .with_body(
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#
          )
          .create_async()
          .await;

        let adapter = AnthropicAdapter::new(
          HttpSettings::new(crate::Provider::Anthropic, "wrong")
            .with_api_base(server.url())
        ).unwrap();

        let err = adapter
          .send(&ChatCall
          {   model: "claude-3-5-sonnet-20241022"
            , system_prompt: ""
            , user_text: "hi"
            , temperature: 0.0
            , max_output_tokens: 16
          })
          .await
          .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::InvalidKey);
    }
}
