//! One-shot command line front end for the task router.
//!
//! Reads configuration from the environment (see
//! `RouterConfig::from_env`), sends a single prompt and prints the
//! generation result as JSON.

use std::path::PathBuf;
use clap::Parser;
use log::debug;

#[derive(Parser, Debug)]
#[command(name = "taskllm", about = "Route a prompt to the AI provider for its task type")]
struct Args
{   /// Task type: creative, analytical, conversational, business
    #[arg(short, long, default_value = "business")]
    task: String
  , /// JSON file whose contents are sent as context
    #[arg(short, long)]
    context: Option<PathBuf>
  , /// Expected reply shape: text, object, array, analysis
    #[arg(short, long, default_value = "text")]
    shape: String
  , /// Session id for conversational turns
    #[arg(long)]
    session: Option<String>
  , /// Print the configured profiles and exit
    #[arg(long)]
    list: bool
  , /// Prompt text
    prompt: Vec<String>
}

fn parse_shape(raw: &str)
  -> Result<taskllm::ShapeHint, taskllm::Error>
{   match raw
    {   "text" => Ok(taskllm::ShapeHint::Text)
      , "object" => Ok(taskllm::ShapeHint::Object)
      , "array" => Ok(taskllm::ShapeHint::Array)
      , "analysis" => Ok(taskllm::ShapeHint::analysis())
      , other => Err(taskllm::Error::InvalidConfiguration(
          format!("unknown shape: {}", other)
        ))
    }
}

fn load_context(path: &PathBuf)
  -> Result<serde_json::Value, taskllm::Error>
{   let raw = std::fs::read_to_string(path).map_err(|e| {
      taskllm::Error::Config(format!("{}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
      .map_err(|e| taskllm::Error::Config(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), taskllm::Error>
{   env_logger::init();
    let args = Args::parse();
    debug!("Arguments: {:?}", args);

    let config = taskllm::RouterConfig::from_env()?;
    let router = taskllm::TaskRouter::from_config(&config)?;

    if args.list
    {   for (name, profile) in router.profiles().iter()
        {   println!(
              "{:<16} {:<10} {:<28} t={}",
              name, profile.provider, profile.model, profile.temperature
            );
        }
        println!("fallback: {}", router.policy().default_target);
        return Ok(());
    }

    let mut request = taskllm::GenerationRequest::new(
      args.task
    , args.prompt.join(" ")
    ).with_shape(parse_shape(&args.shape)?);
    if let Some(path) = &args.context
    {   request = request.with_context(load_context(path)?);
    }
    if let Some(session) = args.session
    {   request = request.with_session(session);
    }

    let result = router.generate(request).await?;
    let output = serde_json::to_string_pretty(&result)
      .map_err(|e| taskllm::Error::Config(e.to_string()))?;
    println!("{}", output);
    Ok(())
}
