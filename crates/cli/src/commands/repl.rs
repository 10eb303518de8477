//! `codeloop`: the interactive session.

use crate::Cli;
use crate::input::{self, Input};
use crate::terminal::{Banner, TerminalOutput, TerminalProgress, short_id};
use codeloop_agent::{AgentLoop, TurnOutcome};
use codeloop_config::AppConfig;
use codeloop_core::{Error, NoopProgress, ProgressSink, SessionStore};
use codeloop_providers::{LocalBackend, ModelChoice, select_model};
use codeloop_storage::{FileStore, NoopStore};
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const HELP: &str = "\
Commands:
  /help                 Show this help
  /usage                Token usage so far
  /reload               Re-read CODELOOP.md and the active plan
  /clear                Start a new session with an empty history
  /session              Show the current session
  /session new [name]   Start a new named session
  /session load <id>    Switch to a stored session
  /sessions             List stored sessions
  /status               Connection and session details
  /plan                 Show the active plan
  /tools                List available tools
  exit, quit            Leave codeloop";

/// Everything the REPL needs besides the loop itself.
struct Repl {
    agent: AgentLoop,
    output: Arc<TerminalOutput>,
    vendor: String,
    host: String,
}

pub async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let working_dir = std::env::current_dir()?;

    // --- Provider ---
    let mut backend =
        LocalBackend::connect(&config.host, &config.vendor, config.api_key.clone().unwrap_or_default())
            .await?;
    let detected = backend.detect_models().await;
    let choice = select_model(config.model.as_deref(), detected)?;
    match &choice {
        ModelChoice::Substituted { requested, using } => {
            eprintln!("Model '{requested}' is not served here, using '{using}'")
        }
        ModelChoice::Fallback(model) => {
            eprintln!("Could not list models, trying configured model '{model}'")
        }
        ModelChoice::Configured(_) | ModelChoice::Detected(_) => {}
    }
    backend.set_model(choice.model());
    let info = backend.info().clone();
    let provider = Arc::new(backend.create_client());

    // --- Storage ---
    let store: Arc<dyn SessionStore> = match FileStore::open(&working_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "Project storage unavailable, sessions will not be saved");
            Arc::new(NoopStore)
        }
    };

    // --- Tools & terminal ---
    let tools = Arc::new(codeloop_tools::registry_with_timeout(Duration::from_secs(
        config.tools.command_timeout_secs,
    )));
    let output = Arc::new(TerminalOutput::new(config.ui.color));
    let progress: Arc<dyn ProgressSink> = if config.ui.spinner && std::io::stderr().is_terminal() {
        Arc::new(TerminalProgress::new())
    } else {
        Arc::new(NoopProgress)
    };

    let mut agent = AgentLoop::new(provider, tools, store.clone())
        .with_progress(progress)
        .with_output(output.clone())
        .with_working_dir(&working_dir)
        .with_model(info.model.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_streaming(config.agent.stream)
        .with_max_iterations(u32::try_from(config.agent.max_iterations).unwrap_or(u32::MAX))
        .with_turn_timeout(Duration::from_secs(config.agent.turn_timeout_secs));

    let resumed = agent.start().await?;

    let mut repl = Repl {
        agent,
        output,
        vendor: info.name.clone(),
        host: info.host.clone(),
    };

    if let Some(message) = &cli.message {
        repl.message(message).await;
        return Ok(());
    }

    let storage = store
        .location()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| store.name().to_string());
    print!(
        "{}",
        Banner {
            vendor: &info.name,
            host: &info.host,
            model: &info.model,
            working_dir: &working_dir,
            storage: &storage,
            resumed: resumed.as_ref().map(|s| (s.id.as_str(), s.messages.len())),
        }
        .render()
    );

    repl.run().await;
    println!("\nGoodbye!");
    Ok(())
}

/// Config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(key) = &cli.key {
        config.api_key = Some(key.clone());
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }
    if let Some(vendor) = &cli.vendor {
        config.vendor = vendor.clone();
    }
    if cli.no_stream {
        config.agent.stream = false;
    }
    if cli.no_spinner {
        config.ui.spinner = false;
    }
    config.validate()?;
    Ok(config)
}

impl Repl {
    async fn run(&mut self) {
        let mut lines = input::spawn_stdin_reader();

        loop {
            prompt();
            let line = tokio::select! {
                line = lines.recv() => line,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            match input::parse_line(&line) {
                Input::Empty => {}
                Input::Exit => break,
                Input::Command(name, args) => self.command(&name, &args).await,
                Input::Message(text) => self.message(&text).await,
            }
        }
    }

    /// Expand `@path` references, then run the turn with Ctrl+C armed.
    async fn message(&mut self, text: &str) {
        let text = match input::expand_file_references(text, self.agent.working_dir()).await {
            Ok(text) => text,
            Err(e) => return self.output.error(&e.to_string()),
        };

        // Ctrl+C takes effect at the next model request; a running tool finishes
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });
        self.turn(&text, &cancel).await;
        watcher.abort();
    }

    /// Run one user turn, reporting failures without leaving the REPL.
    async fn turn(&mut self, text: &str, cancel: &CancellationToken) {
        match self.agent.process_with_cancel(text, cancel).await {
            Ok(TurnOutcome::Answered { .. }) => {}
            Ok(TurnOutcome::IterationLimit { iterations }) => self.output.note(&format!(
                "Stopped after {iterations} tool rounds. Send another message to continue."
            )),
            Err(Error::Interrupted) => self.output.note("\nInterrupted."),
            Err(e) => self.output.error(&e.to_string()),
        }
    }

    async fn command(&mut self, name: &str, args: &[String]) {
        match name {
            "help" => println!("{HELP}"),
            "usage" => println!("{}", self.agent.format_usage()),
            "reload" => {
                self.agent.reload_context().await;
                self.output.note("Reloaded project context.");
            }
            "clear" => match self.agent.clear().await {
                Ok(session) => self.output.note(&format!(
                    "Cleared history. New session {}.",
                    short_id(&session.id)
                )),
                Err(e) => self.output.error(&e.to_string()),
            },
            "session" => self.session_command(args).await,
            "sessions" => self.list_sessions().await,
            "status" => self.status().await,
            "plan" => self.plan().await,
            "tools" => {
                for (name, description) in self.agent.tools().descriptions() {
                    println!("  {name:<18} {description}");
                }
            }
            other => println!("Unknown command: /{other}"),
        }
    }

    async fn session_command(&mut self, args: &[String]) {
        match args.first().map(String::as_str) {
            None => match self.agent.session_id() {
                Some(id) => println!(
                    "Session {id} ({} messages in history)",
                    self.agent.history_len().saturating_sub(1)
                ),
                None => println!("No active session"),
            },
            Some("new") => {
                let name = (args.len() > 1).then(|| args[1..].join(" "));
                match self.agent.new_session(name.as_deref()).await {
                    Ok(session) => self
                        .output
                        .note(&format!("Started session {}.", short_id(&session.id))),
                    Err(e) => self.output.error(&e.to_string()),
                }
            }
            Some("load") => {
                let Some(id) = args.get(1) else {
                    println!("Usage: /session load <id>");
                    return;
                };
                match self.resolve_session(id).await {
                    Some(full) => match self.agent.load_session(&full).await {
                        Ok(session) => self.output.note(&format!(
                            "Loaded session {} ({} messages).",
                            short_id(&session.id),
                            session.messages.len()
                        )),
                        Err(e) => self.output.error(&e.to_string()),
                    },
                    None => self.output.error(&format!("No session matches '{id}'")),
                }
            }
            Some(other) => println!("Unknown command: /session {other}"),
        }
    }

    /// Accept a full id or a unique prefix, as shown by `/sessions`.
    async fn resolve_session(&self, id: &str) -> Option<String> {
        let sessions = self.agent.store().list_sessions().await.ok()?;
        if sessions.iter().any(|s| s.id == id) {
            return Some(id.to_string());
        }
        let mut matches = sessions.into_iter().filter(|s| s.id.starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only.id),
            _ => None,
        }
    }

    async fn list_sessions(&self) {
        let sessions = match self.agent.store().list_sessions().await {
            Ok(s) => s,
            Err(e) => return self.output.error(&e.to_string()),
        };
        if sessions.is_empty() {
            println!("No saved sessions");
            return;
        }
        let active = self.agent.session_id();
        for s in sessions {
            let marker = if Some(s.id.as_str()) == active { " (active)" } else { "" };
            let name = if s.name.is_empty() { String::new() } else { format!(" [{}]", s.name) };
            println!(
                "  {}{name} - {} messages - {}{marker}",
                short_id(&s.id),
                s.message_count,
                s.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    async fn status(&self) {
        let store = self.agent.store();
        println!("Provider:    {} at {}", self.vendor, self.host);
        println!("Model:       {}", self.agent.model());
        println!("Directory:   {}", self.agent.working_dir().display());
        println!("Session:     {}", self.agent.session_id().unwrap_or("none"));
        println!("History:     {} messages", self.agent.history_len());
        println!(
            "Storage:     {}",
            store
                .location()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| store.name().to_string())
        );
        println!("Tools:       {}", self.agent.tools().len());
        println!("Tokens:      {}", self.agent.usage().total_tokens);
    }

    async fn plan(&self) {
        match self.agent.store().get_active_plan().await {
            Ok(Some(plan)) => {
                println!("{}", plan.title);
                for (i, task) in plan.tasks.iter().enumerate() {
                    println!("  {}. {} {}", i + 1, task.status.marker(), task.content);
                }
            }
            Ok(None) => println!("No active plan"),
            Err(e) => self.output.error(&e.to_string()),
        }
    }
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "❯ ");
    let _ = out.flush();
}
