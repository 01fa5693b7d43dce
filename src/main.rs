use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use superdesign::agents::default_session_id;
use superdesign::llm::GenerateOptions;
use superdesign::message::{MessageContent, SdkMessage, SdkMessageType};
use superdesign::{
    Agent, AgentBuilder, AgentConfig, CodingAgent, Message, MessageCallback, TaskOptions,
};

#[derive(Parser)]
#[command(name = "superdesign", version)]
#[command(about = "An AI design agent that iterates on UI designs in your project", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// LLM provider to use (openai, anthropic, google, openrouter)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model to use (provider-specific)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Project root the agent works in (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single design task
    Run {
        /// The task to perform
        task: String,

        /// Print uniform messages as JSON lines instead of text
        #[arg(long)]
        json: bool,

        /// Maximum model round-trips
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Start an interactive conversation
    Chat {
        /// Session id to use
        #[arg(long)]
        session: Option<String>,
    },

    /// Stream a plain model response without tools
    Stream {
        /// The prompt to send
        prompt: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_agent(cli: &Cli) -> Result<CodingAgent> {
    // Configuration precedence: CLI > env > project > global > defaults
    let mut config = AgentConfig::load().unwrap_or_else(|e| {
        debug!(error = %e, "failed to load config, using defaults");
        AgentConfig::default()
    });
    if let Some(provider) = &cli.provider {
        config.override_provider(provider.clone());
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }

    let mut builder = AgentBuilder::new()
        .with_config(&config)
        .context("failed to configure LLM provider")?
        .default_tools();
    if let Some(project) = &cli.project {
        builder = builder.working_dir(project);
    }

    builder.build().context("failed to build agent")
}

/// Cancel `token` on Ctrl-C until the returned handle is aborted
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling task");
            token.cancel();
        }
    })
}

fn print_message(message: &SdkMessage) {
    match (&message.kind, &message.content) {
        (SdkMessageType::User, MessageContent::Text(_)) => {}
        (SdkMessageType::Assistant, MessageContent::Text(text)) => println!("\n{}", text),
        (SdkMessageType::Assistant, MessageContent::Structured(call)) => {
            println!("→ {} {}", call["tool_name"].as_str().unwrap_or("tool"), call["args"]);
        }
        (SdkMessageType::User, MessageContent::Structured(result)) => {
            let marker = if result["is_error"].as_bool().unwrap_or(false) {
                "✗"
            } else {
                "✓"
            };
            let text = result["result"].as_str().unwrap_or_default();
            let first_line = text.lines().next().unwrap_or_default();
            println!("  {} {}", marker, first_line);
        }
        (SdkMessageType::Result, MessageContent::Text(text)) if message.is_error => {
            eprintln!("error: {}", text);
        }
        _ => {}
    }
}

fn json_printer() -> MessageCallback {
    Arc::new(|message: &SdkMessage| match serde_json::to_string(message) {
        Ok(line) => println!("{}", line),
        Err(e) => error!(error = %e, "failed to serialize message"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let agent = build_agent(&cli)?;

    match cli.command {
        Commands::Run {
            task,
            json,
            max_steps,
        } => {
            info!(provider = %agent.llm().config().provider.kind, "starting task");

            let cancel = CancellationToken::new();
            let _interrupt = cancel_on_ctrl_c(cancel.clone());

            let callback: MessageCallback = if json {
                json_printer()
            } else {
                Arc::new(print_message)
            };
            let options = TaskOptions {
                max_steps,
                cancel: Some(cancel),
                on_message: Some(callback),
                ..Default::default()
            };

            let result = agent.execute_task_with_streaming(&task, options).await;
            if !result.success {
                anyhow::bail!(
                    "task failed: {}",
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            if !json {
                println!(
                    "\nDone in {:.1}s. Tools used: {}",
                    result.duration_ms as f64 / 1000.0,
                    if result.tools_used.is_empty() {
                        "none".to_string()
                    } else {
                        result.tools_used.join(", ")
                    }
                );
            }
        }

        Commands::Chat { session } => {
            let session_id = session.unwrap_or_else(default_session_id);
            agent.get_session(&session_id, agent.working_dir());
            info!(session_id = %session_id, "chat started");
            println!("Session {}. Type a request, or 'exit' to quit.", session_id);

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                std::io::stdout().flush().ok();

                let Some(line) = lines.next_line().await.context("failed to read input")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }

                let cancel = CancellationToken::new();
                let interrupt = cancel_on_ctrl_c(cancel.clone());
                let options = TaskOptions {
                    cancel: Some(cancel),
                    on_message: Some(Arc::new(print_message)),
                    ..Default::default()
                };

                let outcome = agent.continue_conversation(line, &session_id, options).await;
                interrupt.abort();
                outcome.context("conversation failed")?;
                agent.cleanup_idle_sessions();
            }
        }

        Commands::Stream { prompt } => {
            let response = agent
                .llm()
                .generate_streaming_response(&[Message::user(prompt)], GenerateOptions::default())
                .context("failed to start streaming")?;

            let mut stream = response.stream;
            while let Some(fragment) = stream.next().await {
                let fragment = fragment.context("streaming failed")?;
                print!("{}", fragment);
                std::io::stdout().flush().ok();
            }
            println!();

            if let Some(usage) = response.usage.get() {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "stream usage"
                );
            }
        }
    }

    Ok(())
}
