//! Terminal client for the clinician chat assistant.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use spinners::{Spinner, Spinners};
use tokio_util::sync::CancellationToken;

use physio_chat::{
    ChatBuilder, ChatConfig, ChatError, ChatSession, ReplyUpdate, TurnOutcome,
};

/// Chat with the clinician assistant from a terminal
#[derive(Parser, Debug)]
#[command(name = "physio-chat", version)]
struct Cli {
    /// Send a single prompt and exit instead of starting an interactive session
    prompt: Option<String>,

    /// Path to a YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// System prompt
    #[arg(long)]
    system: Option<String>,

    /// Timeout for blocking requests in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ChatConfig::load(cli.config.as_deref())?;
    let mut builder = ChatBuilder::from_config(&config);
    if let Some(endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(api_key) = cli.api_key {
        builder = builder.api_key(api_key);
    }
    if let Some(model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(system) = cli.system {
        builder = builder.system(system);
    }
    if let Some(timeout) = cli.timeout {
        builder = builder.timeout_seconds(timeout);
    }
    if cli.no_stream {
        builder = builder.stream(false);
    }
    let session = builder.build()?;

    if let Some(prompt) = cli.prompt {
        run_prompt(&session, &prompt).await?;
        return Ok(());
    }

    let mut rl = DefaultEditor::new()?;
    println!(
        "{}",
        "Type /clear to start over, /quit to leave.".bright_black()
    );
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        session.clear().await;
                        println!("{}", "Conversation cleared.".bright_black());
                        continue;
                    }
                    _ => {}
                }

                if let Err(e) = run_prompt(&session, line).await {
                    eprintln!("{} {}", "Error:".bright_red(), e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{} {}", "Error:".bright_red(), e);
                break;
            }
        }
    }

    Ok(())
}

/// Sends one prompt, printing the reply as it arrives. Ctrl-C cancels the turn.
async fn run_prompt(session: &ChatSession, prompt: &str) -> Result<(), ChatError> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut spinner = Some(Spinner::new(Spinners::Dots12, "Thinking...".into()));
    let mut printed = false;
    let result = session
        .send_with(prompt, &cancel, |update| {
            if let Some(mut sp) = spinner.take() {
                sp.stop_with_newline();
                print!("{} ", "assistant>".bright_blue());
            }
            // Partial streamed text is already on screen.
            if printed && matches!(update, ReplyUpdate::Replace(_)) {
                println!();
                println!("{}", "(stream interrupted, full reply follows)".yellow());
                print!("{} ", "assistant>".bright_blue());
            }
            print!("{}", update.text());
            printed = true;
            let _ = std::io::stdout().flush();
        })
        .await;
    interrupt.abort();

    if let Some(mut sp) = spinner.take() {
        sp.stop_with_newline();
    }
    println!();

    match result?.outcome {
        TurnOutcome::Cancelled => eprintln!("{}", "(cancelled)".yellow()),
        TurnOutcome::Streamed
        | TurnOutcome::Blocking
        | TurnOutcome::WholeReply
        | TurnOutcome::FellBack(_) => {}
    }
    Ok(())
}
