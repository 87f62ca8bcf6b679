use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use taskllm::{
  Adapter, AdapterError, AdapterErrorKind, AdapterSet, ChatCall
, ChatReply, Error, FallbackPolicy, GenerationRequest, ModelTarget
, ProfileTable, Provider, RouterConfig, ShapeHint, TaskRouter
};

fn init_logging()
{   let _ = env_logger::builder().is_test(true).try_init();
}

/// What a mock adapter saw for one call
#[derive(Debug, Clone)]
struct SeenCall
{   model: String
  , system_prompt: String
  , user_text: String
  , temperature: f32
}

/// Adapter replaying a fixed script of replies or error texts
struct ScriptedAdapter
{   provider: Provider
  , script: Mutex<VecDeque<Result<String, String>>>
  , calls: Mutex<Vec<SeenCall>>
}

impl ScriptedAdapter
{   fn new(
      provider: Provider
    , script: Vec<Result<&str, &str>>
    ) -> Arc<Self>
    {   Arc::new(ScriptedAdapter
        {   provider
          , script: Mutex::new(
              script
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect()
            )
          , calls: Mutex::new(Vec::new())
        })
    }

    fn calls(&self) -> Vec<SeenCall>
    {   self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Adapter for ScriptedAdapter
{   fn provider(&self) -> Provider
    {   self.provider
    }

    async fn send(
      &self
    , call: &ChatCall<'_>
    ) -> Result<ChatReply, AdapterError>
    {   self.calls.lock().unwrap().push(SeenCall
        {   model: call.model.to_string()
          , system_prompt: call.system_prompt.to_string()
          , user_text: call.user_text.to_string()
          , temperature: call.temperature
        });
        let next = self.script.lock().unwrap().pop_front();
        match next
        {   Some(Ok(text)) => Ok(ChatReply { text, usage: None })
          , Some(Err(message)) => {
              Err(AdapterError::classified(self.provider, message))
            }
          , None => Ok(ChatReply
            {   text: format!("{} reply", self.provider)
              , usage: None
            })
        }
    }
}

/// Adapter that never answers
struct StalledAdapter
{   provider: Provider
}

#[async_trait::async_trait]
impl Adapter for StalledAdapter
{   fn provider(&self) -> Provider
    {   self.provider
    }

    async fn send(
      &self
    , _call: &ChatCall<'_>
    ) -> Result<ChatReply, AdapterError>
    {   tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ChatReply { text: "late".to_string(), usage: None })
    }
}

fn fallback_target() -> ModelTarget
{   ModelTarget::new(Provider::OpenAI, "gpt-4o-mini")
}

fn adapters() -> AdapterSet
{   AdapterSet::new()
}

fn router_with(set: AdapterSet) -> TaskRouter
{   init_logging();
    TaskRouter::new(
      Arc::new(ProfileTable::builtin().unwrap())
    , set
    , FallbackPolicy::new(fallback_target())
    )
}

#[tokio::test]
async fn test_unknown_task_type_uses_business_profile()
{   let openai = ScriptedAdapter::new(Provider::OpenAI, vec![Ok("done")]);
    let router = router_with(adapters().with_adapter(openai.clone()));

    let result = assert_ok!(
      router.route("poetry", "Write something", None).await
    );
    assert_eq!(result.task_type, "business");
    assert_eq!(result.provider_used, Provider::OpenAI);
    assert_eq!(result.model_used, "gpt-4o-mini");
    assert!(!result.fallback_applied);

    let calls = openai.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].system_prompt.contains("business assistant"));
    assert_eq!(calls[0].temperature, 0.5);
}

#[tokio::test]
async fn test_known_task_type_uses_its_provider()
{   let anthropic = ScriptedAdapter::new(
      Provider::Anthropic
    , vec![Ok("Spring sale copy")]
    );
    let openai = ScriptedAdapter::new(Provider::OpenAI, vec![]);
    let router = router_with(
      adapters()
        .with_adapter(anthropic.clone())
        .with_adapter(openai.clone())
    );

    let result = assert_ok!(
      router.route("creative", "Spring sale banner", None).await
    );
    assert_eq!(result.raw_text, "Spring sale copy");
    assert_eq!(result.provider_used, Provider::Anthropic);
    assert_eq!(anthropic.calls()[0].model, "claude-3-5-sonnet-20241022");
    assert!(openai.calls().is_empty());
}

#[tokio::test]
async fn test_primary_failure_retries_default_once()
{   let anthropic = ScriptedAdapter::new(
      Provider::Anthropic
    , vec![Err("Unsupported parameter: temperature")]
    );
    let openai = ScriptedAdapter::new(
      Provider::OpenAI
    , vec![Ok("fallback copy")]
    );
    let router = router_with(
      adapters()
        .with_adapter(anthropic.clone())
        .with_adapter(openai.clone())
    );

    let result = assert_ok!(
      router.route("creative", "Tagline please", None).await
    );
    assert!(result.fallback_applied);
    assert_eq!(result.provider_used, Provider::OpenAI);
    assert_eq!(result.model_used, "gpt-4o-mini");
    assert_eq!(result.raw_text, "fallback copy");
    // creative profile still names the task
    assert_eq!(result.task_type, "creative");

    assert_eq!(anthropic.calls().len(), 1);
    let fallback_calls = openai.calls();
    assert_eq!(fallback_calls.len(), 1);
    assert_eq!(fallback_calls[0].user_text, anthropic.calls()[0].user_text);
    assert_eq!(
      fallback_calls[0].system_prompt
    , anthropic.calls()[0].system_prompt
    );
}

#[tokio::test]
async fn test_quota_twice_surfaces_generation_failed()
{   let openai = ScriptedAdapter::new(
      Provider::OpenAI
    , vec![
        Err("You exceeded your current quota")
      , Err("You exceeded your current quota")
      , Ok("never reached")
      ]
    );
    let router = router_with(adapters().with_adapter(openai.clone()));

    let err = assert_err!(
      router.route("analytical", "Summarise pipeline", None).await
    );
    assert!(matches!(
      err
    , Error::GenerationFailed { kind: AdapterErrorKind::Quota, .. }
    ));
    // primary (gpt-4o) then default (gpt-4o-mini), nothing more
    let models: Vec<String>
      = openai.calls().into_iter().map(|c| c.model).collect();
    assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"]);
}

#[tokio::test]
async fn test_last_error_kind_is_reported()
{   let google = ScriptedAdapter::new(
      Provider::Google
    , vec![Err("quota exceeded")]
    );
    let openai = ScriptedAdapter::new(
      Provider::OpenAI
    , vec![Err("Incorrect API key provided: invalid")]
    );
    let router = router_with(
      adapters()
        .with_adapter(google.clone())
        .with_adapter(openai.clone())
    );

    let err = assert_err!(
      router.route("conversational", "hello", None).await
    );
    assert_eq!(err.adapter_kind(), Some(AdapterErrorKind::InvalidKey));
    assert_eq!(google.calls().len(), 1);
    assert_eq!(openai.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_adapter_falls_back()
{   let openai = ScriptedAdapter::new(Provider::OpenAI, vec![Ok("ok")]);
    let router = router_with(adapters().with_adapter(openai.clone()));

    let result = assert_ok!(
      router.route("conversational", "Any tasks due?", None).await
    );
    assert!(result.fallback_applied);
    assert_eq!(result.provider_used, Provider::OpenAI);
    assert_eq!(openai.calls().len(), 1);
}

#[tokio::test]
async fn test_no_adapters_at_all_fails()
{   let router = router_with(adapters());
    let err = assert_err!(
      router.route("business", "hello", None).await
    );
    assert_eq!(err.adapter_kind(), Some(AdapterErrorKind::InvalidKey));
}

#[tokio::test]
async fn test_empty_prompt_is_rejected_without_calls()
{   let openai = ScriptedAdapter::new(Provider::OpenAI, vec![]);
    let router = router_with(adapters().with_adapter(openai.clone()));

    let err = assert_err!(router.route("business", "   ", None).await);
    assert_eq!(err, Error::EmptyPrompt);
    assert!(openai.calls().is_empty());
}

#[tokio::test]
async fn test_context_is_rendered_ahead_of_prompt()
{   let openai = ScriptedAdapter::new(Provider::OpenAI, vec![]);
    let router = router_with(adapters().with_adapter(openai.clone()));
    let context = json!({"lead": {"name": "Acme Ltd", "status": "qualified"}});

    assert_ok!(
      router
        .route("business", "Draft a follow-up", Some(&context))
        .await
    );
    let user_text = &openai.calls()[0].user_text;
    assert!(user_text.starts_with("Context:\n"));
    assert!(user_text.contains("Acme Ltd"));
    assert!(user_text.ends_with("Draft a follow-up"));
}

#[tokio::test]
async fn test_structured_reply_is_parsed()
{   let openai = ScriptedAdapter::new(
      Provider::OpenAI
    , vec![Ok(r#"{"insights":["a"],"recommendations":["b"],"next_steps":["c"]}"#)]
    );
    let router = router_with(adapters().with_adapter(openai));

    let request = GenerationRequest::new("analytical", "Analyse Q3 leads")
      .with_shape(ShapeHint::analysis());
    let result = assert_ok!(router.generate(request).await);
    assert_eq!(
      result.structured
    , Some(json!({"insights":["a"],"recommendations":["b"],"next_steps":["c"]}))
    );
    assert!(result.degraded.is_none());
    assert_eq!(result.payload(), result.structured.clone().unwrap());
}

#[tokio::test]
async fn test_unparseable_reply_degrades()
{   let openai = ScriptedAdapter::new(
      Provider::OpenAI
    , vec![Ok("not valid json")]
    );
    let router = router_with(adapters().with_adapter(openai));

    let request = GenerationRequest::new("business", "Score this lead")
      .with_shape(ShapeHint::Object);
    let result = assert_ok!(router.generate(request).await);
    assert_eq!(result.raw_text, "not valid json");
    assert!(result.structured.is_none());
    assert_eq!(
      result.payload()
    , json!({"content": "not valid json", "formatted": false})
    );
}

#[tokio::test]
async fn test_session_id_passes_through()
{   let google = ScriptedAdapter::new(Provider::Google, vec![Ok("Hi!")]);
    let router = router_with(adapters().with_adapter(google));

    let request = GenerationRequest::new("conversational", "Hello")
      .with_session("sess-42");
    let result = assert_ok!(router.generate(request).await);
    assert_eq!(result.session_id.as_deref(), Some("sess-42"));
    assert_eq!(result.provider_used, Provider::Google);
}

#[tokio::test]
async fn test_same_input_selects_same_profile()
{   let openai = ScriptedAdapter::new(Provider::OpenAI, vec![]);
    let router = router_with(adapters().with_adapter(openai.clone()));

    for _ in 0..2
    {   assert_ok!(router.route("unknown-kind", "Same prompt", None).await);
    }
    let calls = openai.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].model, calls[1].model);
    assert_eq!(calls[0].system_prompt, calls[1].system_prompt);
    assert_eq!(router.resolve("unknown-kind"), router.resolve("unknown-kind"));
}

#[tokio::test]
async fn test_concurrent_requests_share_router()
{   let openai = ScriptedAdapter::new(Provider::OpenAI, vec![]);
    let router = router_with(adapters().with_adapter(openai.clone()));

    let handles: Vec<_> = (0..8)
      .map(|i| {
        let router = router.clone();
        tokio::spawn(async move {
          router.route("business", &format!("prompt {}", i), None).await
        })
      })
      .collect();

    for handle in handles
    {   let result = handle.await.unwrap();
        assert_ok!(result);
    }
    assert_eq!(openai.calls().len(), 8);
}

#[tokio::test]
async fn test_cancelled_request_makes_no_fallback_call()
{   let fallback = ScriptedAdapter::new(Provider::OpenAI, vec![]);
    let router = router_with(
      adapters()
        .with_adapter(Arc::new(StalledAdapter { provider: Provider::Anthropic }))
        .with_adapter(fallback.clone())
    );

    let outcome = tokio::time::timeout(
      Duration::from_millis(50)
    , router.route("creative", "Slow one", None)
    ).await;
    assert!(outcome.is_err());
    assert!(fallback.calls().is_empty());
}

#[tokio::test]
async fn test_router_from_default_config_without_keys()
{   init_logging();
    // no provider keys for these names in the test environment
    let mut config = RouterConfig::default();
    for provider in &mut config.providers
    {   provider.api_key_env = Some(format!(
          "TASKLLM_UNSET_{}_KEY",
          provider.provider.as_str().to_uppercase()
        ));
    }

    let router = assert_ok!(TaskRouter::from_config(&config));
    let err = assert_err!(router.route("business", "hi", None).await);
    assert_eq!(err.adapter_kind(), Some(AdapterErrorKind::InvalidKey));
}

#[tokio::test]
#[ignore]
async fn test_live_generation_from_env()
{   init_logging();
    let config = match RouterConfig::from_env()
    {   Ok(c) => c
      , Err(e) => {
          println!("Skipping: config error: {}", e);
          return;
        }
    };
    let router = match TaskRouter::from_config(&config)
    {   Ok(r) => r
      , Err(e) => {
          println!("Skipping: {}", e);
          return;
        }
    };

    let request = GenerationRequest::new(
      "analytical"
    , "Three quick insights about a pipeline with 40 leads, 5 won."
    ).with_shape(ShapeHint::analysis());

    match router.generate(request).await
    {   Ok(result) => {
          println!(
            "{} via {} (fallback {}): {}",
            result.task_type, result.model_used,
            result.fallback_applied, result.raw_text
          );
          assert!(!result.raw_text.is_empty());
          assert!(result.payload().is_object());
        }
      , Err(e) => {
          println!("Generation failed: {}", e);
        }
    }
}
