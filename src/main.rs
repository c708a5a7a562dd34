//! darwin-ask: send one completion through the orchestrator

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{debug, error};

use darwin_llm::{
  CompletionRequest, Orchestrator, OrchestratorConfig, Part, StructuredOutput,
};

#[derive(Debug, Parser)]
#[command(name = "darwin-ask", about = "Send one request through the Darwin orchestrator")]
struct Args
{   /// JSON config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>
  , #[arg(long, default_value = "You are a careful claims analyst.")]
    system: String
  , #[arg(long)]
    prompt: String
  , /// Attach a document (repeatable, at most three)
    #[arg(long = "document")]
    documents: Vec<PathBuf>
  , /// JSON Schema file for structured output
    #[arg(long, requires = "schema_name")]
    schema: Option<PathBuf>
  , #[arg(long)]
    schema_name: Option<String>
  , #[arg(long, default_value_t = 0.3)]
    temperature: f32
  , #[arg(long, default_value_t = 4096)]
    max_tokens: u32
  , /// Outer deadline for the whole request
    #[arg(long)]
    deadline_secs: Option<u64>
}

fn mime_for(path: &Path) -> &'static str
{   let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase());
    match ext.as_deref()
    {   Some("pdf") => "application/pdf"
      , Some("png") => "image/png"
      , Some("jpg") | Some("jpeg") => "image/jpeg"
      , Some("webp") => "image/webp"
      , Some("txt") => "text/plain"
      , _ => "application/octet-stream"
    }
}

fn build_request(
  args: &Args
) -> Result<CompletionRequest, Box<dyn std::error::Error>>
{   let mut builder = CompletionRequest::builder(args.system.clone())
      .temperature(args.temperature)
      .max_output_tokens(args.max_tokens)
      .text(args.prompt.clone());

    for path in &args.documents
    {   let data = std::fs::read(path)?;
        debug!("Attaching {} ({} bytes)", path.display(), data.len());
        builder = builder.part(Part::document(mime_for(path), data));
    }

    if let (Some(path), Some(name)) = (&args.schema, &args.schema_name)
    {   let raw = std::fs::read_to_string(path)?;
        let schema: serde_json::Value = serde_json::from_str(&raw)?;
        builder = builder.structured(StructuredOutput::new(name.clone(), schema));
    }

    Ok(builder.build()?)
}

async fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>>
{   let config = match &args.config
    {   Some(path) => OrchestratorConfig::from_json_file(path)?
      , None => OrchestratorConfig::default()
    }.with_env_overrides();

    let orchestrator = Orchestrator::with_http(&config)?;
    let request = build_request(&args)?;

    let result = match args.deadline_secs
    {   Some(secs) => {
          orchestrator
            .complete_within(&request, Duration::from_secs(secs))
            .await
        }
      , None => orchestrator.complete(&request).await
    };

    match result
    {   Ok(result) => {
          if let Some(degraded) = &result.degraded
          {   eprintln!("[degraded: {}]", degraded.reason.as_str());
          }
          if let Some(candidate) = &result.candidate
          {   eprintln!("[served by {}]", candidate);
          }
          match &result.structured
          {   Some(value) => println!("{}", serde_json::to_string_pretty(value)?)
            , None => println!("{}", result.text)
          }
          Ok(true)
        }
      , Err(e) => {
          error!("{}", e);
          eprintln!("HTTP {}: {}", e.http_status(), e.user_message());
          eprintln!("{}", e);
          Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode
{   env_logger::init();
    let args = Args::parse();
    match run(args).await
    {   Ok(true) => ExitCode::SUCCESS
      , Ok(false) => ExitCode::FAILURE
      , Err(e) => {
          eprintln!("darwin-ask: {}", e);
          ExitCode::FAILURE
        }
    }
}
