use serde::{Deserialize, Serialize};
use log::{debug, trace, error, warn};

pub const API_BASE: &str
  = "https://generativelanguage.googleapis.com/v1beta";

// ===== Wire Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart
{   #[serde(default)]
    pub text: Option<String>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent
{   #[serde(default)]
    pub parts: Vec<GeminiPart>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig
{   pub temperature: f32
  , pub max_output_tokens: u32
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest
{   pub contents: Vec<GeminiContent>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>
  , pub generation_config: GenerationConfig
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
  , #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>
  , #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<GeminiContent>
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata
{   #[serde(default)]
    pub prompt_token_count: Option<u64>
  , #[serde(default)]
    pub candidates_token_count: Option<u64>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback
{   #[serde(default)]
    pub block_reason: Option<String>
}

// ===== Adapter =====

/// Google Gemini generateContent adapter
pub struct GeminiAdapter
{   settings: super::HttpSettings
  , http_client: reqwest::Client
}

impl GeminiAdapter
{   pub fn new(
      settings: super::HttpSettings
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating GeminiAdapter for {}", settings.api_base);
        let http_client = settings.build_client()?;
        Ok(GeminiAdapter
        {   settings
          , http_client
        })
    }
}

#[async_trait::async_trait]
impl super::Adapter for GeminiAdapter
{   fn provider(&self) -> crate::Provider
    {   crate::Provider::Google
    }

    async fn send(
      &self
    , call: &super::ChatCall<'_>
    ) -> Result<super::ChatReply, crate::error::AdapterError>
    {   debug!("Sending Gemini request for model: {}", call.model);

        let request = build_request(call);
        trace!("Gemini request: {:?}", request);

        let response = self.http_client
          .post(format!(
            "{}/models/{}:generateContent",
            self.settings.api_base, call.model
          ))
          .header("x-goog-api-key", &self.settings.api_key)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            super::transport_error(crate::Provider::Google, e)
          })?;

        let body = super::read_body(crate::Provider::Google, response)
          .await?;
        parse_response(&body)
    }
}

pub fn build_request(call: &super::ChatCall<'_>) -> GeminiRequest
{   let system_instruction = if call.system_prompt.trim().is_empty()
    {   None
    } else
    {   Some(GeminiContent
        {   parts: vec![
              GeminiPart { text: Some(call.system_prompt.to_string()) }
            ]
          , role: None
        })
    };

    GeminiRequest
    {   contents: vec![
          GeminiContent
          {   parts: vec![
                GeminiPart { text: Some(call.user_text.to_string()) }
              ]
            , role: Some("user".to_string())
          }
        ]
      , system_instruction
      , generation_config: GenerationConfig
        {   temperature: call.temperature
          , max_output_tokens: call.max_output_tokens
        }
    }
}

/// Parse a generateContent body into the first candidate's text
pub fn parse_response(
  body: &str
) -> Result<super::ChatReply, crate::error::AdapterError>
{   let api: GeminiResponse
      = serde_json::from_str(body).map_err(|e| {
        error!("Gemini parse error: {}", e);
        crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::Google
        , format!("malformed response: {}", e)
        )
      })?;

    if let Some(reason) = api.prompt_feedback
      .as_ref()
      .and_then(|f| f.block_reason.as_ref())
    {   warn!("Gemini blocked the prompt: {}", reason);
        return Err(crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::Google
        , format!("prompt blocked: {}", reason)
        ));
    }

    let usage = api.usage_metadata.as_ref().map(|u| {
      crate::request::TokenUsage
      {   input_tokens: u.prompt_token_count.unwrap_or(0)
        , output_tokens: u.candidates_token_count.unwrap_or(0)
      }
    });
    if let Some(usage) = &usage
    {   debug!(
          "Gemini usage: {} in / {} out",
          usage.input_tokens, usage.output_tokens
        );
    }

    let text: String = api.candidates
      .into_iter()
      .next()
      .and_then(|c| c.content)
      .map(|content| {
        content.parts
          .into_iter()
          .filter_map(|p| p.text)
          .collect::<Vec<_>>()
          .join("")
      })
      .unwrap_or_default();

    if text.trim().is_empty()
    {   error!("No candidate text in Gemini response");
        return Err(crate::error::AdapterError::new(
          crate::error::AdapterErrorKind::Unknown
        , crate::Provider::Google
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

    fn call() -> ChatCall<'static>
    {   ChatCall
        {   model: "gemini-1.5-flash"
          , system_prompt: "Be friendly."
          , user_text: "Any follow-ups today?"
          , temperature: 0.7
          , max_output_tokens: 128
        }
    }

    #[test]
    fn request_uses_camel_case_fields()
    {   let json = serde_json::to_value(build_request(&call())).unwrap();
        assert_eq!(
          json["systemInstruction"]["parts"][0]["text"]
        , "Be friendly."
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 128);
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn parses_candidate_parts()
    {   let reply = parse_response(
          r#"{"candidates":[{"content":{"parts":[{"text":"Two "},{"text":"calls."}],"role":"model"},
              "finishReason":"STOP"}],
              "usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":3,"totalTokenCount":10}}"#
        ).unwrap();
        assert_eq!(reply.text, "Two calls.");
        assert_eq!(reply.usage.unwrap().input_tokens, 7);
    }

    #[test]
    fn blocked_prompt_is_an_error()
    {   let err = parse_response(
          r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#
        ).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Unknown);
        assert!(err.message.contains("SAFETY"));
    }

    #[tokio::test]
    async fn send_posts_to_generate_content()
    {   let mut server = mockito::Server::new_async().await;
        let mock = server
          .mock("POST", "/models/gemini-1.5-flash:generateContent")
          .match_header("x-goog-api-key", "g-test")
          .with_status(200)
          .with_body(
            r#"{"candidates":[{"content":{"parts":[{"text":"Yes, two."}]}}]}"#
          )
          .create_async()
          .await;

        let adapter = GeminiAdapter::new(
          HttpSettings::new(crate::Provider::Google, "g-test")
            .with_api_base(server.url())
        ).unwrap();

        let reply = adapter.send(&call()).await.unwrap();
        assert_eq!(reply.text, "Yes, two.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn resource_exhausted_is_quota()
    {   let mut server = mockito::Server::new_async().await;
        let _mock = server
          .mock("POST", "/models/gemini-1.5-flash:generateContent")
          .with_status(429)
          .with_body(
            r#"{"error":{"code":429,"message":"Quota exceeded for quota metric","status":"RESOURCE_EXHAUSTED"}}"#
          )
          .create_async()
          .await;

        let adapter = GeminiAdapter::new(
          HttpSettings::new(crate::Provider::Google, "g-test")
            .with_api_base(server.url())
        ).unwrap();

        let err = adapter.send(&call()).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Quota);
    }
}
