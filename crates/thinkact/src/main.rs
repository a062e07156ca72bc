//! Run a think-act agent against a scripted model transcript.
//!
//! The transcript replaces a live model: each turn is either a response
//! (text plus tool calls) or an error. Useful for replaying a session and
//! for checking retry, escalation, and step-cap behavior offline.
//!
//! # Examples
//!
//! ```sh
//! thinkact run --transcript session.json
//! thinkact run --transcript session.json --max-steps 5 --verbose
//! RUST_LOG=thinkact=trace thinkact run --transcript session.json
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thinkact::prelude::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Think-act agent runner.
#[derive(Parser)]
#[command(name = "thinkact", version)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent until it completes, fails, is interrupted, or hits the
    /// step cap.
    Run {
        /// JSON transcript of model turns to replay.
        #[arg(long)]
        transcript: PathBuf,

        /// Model name reported to collaborators.
        #[arg(long, default_value = "scripted")]
        model: String,

        /// Maximum steps before asking for a final summary (0 = no cap).
        #[arg(long, default_value_t = 20)]
        max_steps: u32,

        /// Instruction placed at the top of every environment message.
        #[arg(long, default_value = "")]
        prompt: String,

        /// Plan id used for records and interruption.
        #[arg(long, default_value = "cli-plan")]
        plan_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Command::Run {
            transcript,
            model,
            max_steps,
            prompt,
            plan_id,
        } => {
            let client = match ScriptedModelClient::from_transcript_file(&transcript) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };

            let config = EngineConfig::new(model, "cli-agent")
                .with_next_step_prompt(prompt)
                .with_max_steps((max_steps > 0).then_some(max_steps));

            let tools = Arc::new(
                ToolRegistry::new()
                    .with(ThinkTool::new("default"))
                    .with(TerminateTool::new("default"))
                    .with(ErrorReportTool::new("default")),
            );
            let records = Arc::new(MemoryRecordSink::new());
            let collaborators = Collaborators::with_defaults(client.clone(), tools.clone(), &config)
                .with_records(records.clone())
                .with_events(Arc::new(LoggingHandler));

            let mut agent =
                match ThinkActAgent::new(config, PlanContext::root(plan_id), tools, collaborators) {
                    Ok(agent) => agent,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        process::exit(1);
                    }
                };

            let result = agent.run().await;

            println!("{}", result.state);
            println!("{}", result.text);
            if let Some(error) = agent.step_error_message() {
                eprintln!("Step error: {error}");
            }
            eprintln!(
                "{} step(s), {} model call(s), {} think/act record(s)",
                agent.current_step(),
                client.call_count(),
                records.think_acts().len()
            );

            if result.state == AgentState::Failed {
                process::exit(2);
            }
        }
    }
}
