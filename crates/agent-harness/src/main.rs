//! CLI entry point (spec §6.1).
//!
//! A single dispatcher over mutually-exclusive modes; the first one present
//! on the command line wins. With no mode flag, `--interactive-editor` is
//! the default (the TTY editor UI itself is an external collaborator, spec
//! §1 — this binary only drives the agent loop behind it).

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use agent_harness::config::Config;
use agent_harness::driver::{AgentDriver, CommandInstruction, Provider};
use agent_harness::executor::{audit, docs, tasks};
use agent_harness::hooks::dispatcher::HookDispatcher;
use agent_harness::hooks::input::{HookEvent, HookEventName};
use agent_harness::logging;

#[derive(Parser, Debug)]
#[command(name = "agent-harness", about = "LLM-agent orchestrator CLI")]
struct Cli {
    #[arg(long, default_value = "agent-harness.yaml")]
    config: PathBuf,

    #[arg(long)]
    interactive_editor: bool,

    #[arg(long, value_name = "STRING")]
    query: Option<String>,

    #[arg(long, value_name = "FILE")]
    print: Option<PathBuf>,

    #[arg(long, value_name = "NAME")]
    hook: Option<String>,

    #[arg(long, value_name = "DIR")]
    audit: Option<PathBuf>,

    #[arg(long)]
    retry_errors: bool,

    #[arg(long, value_name = "FILE|DIR")]
    tasks: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    sync: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    docs: Option<PathBuf>,

    #[arg(long)]
    parallel: bool,

    #[arg(long, value_name = "STRING")]
    user_instruction: Option<String>,

    #[arg(long, value_name = "DIR")]
    root_dir: Option<PathBuf>,
}

enum Mode {
    InteractiveEditor,
    Query(String),
    Print(PathBuf),
    Hook(String),
    Audit(PathBuf),
    Tasks(PathBuf),
    Sync(PathBuf),
    Docs(PathBuf),
}

impl Cli {
    /// First-match-wins mode resolution (spec §6.1 table order).
    fn mode(&self) -> Mode {
        if self.interactive_editor {
            return Mode::InteractiveEditor;
        }
        if let Some(q) = &self.query {
            return Mode::Query(q.clone());
        }
        if let Some(p) = &self.print {
            return Mode::Print(p.clone());
        }
        if let Some(h) = &self.hook {
            return Mode::Hook(h.clone());
        }
        if let Some(d) = &self.audit {
            return Mode::Audit(d.clone());
        }
        if let Some(d) = &self.tasks {
            return Mode::Tasks(d.clone());
        }
        if let Some(d) = &self.sync {
            return Mode::Sync(d.clone());
        }
        if let Some(d) = &self.docs {
            return Mode::Docs(d.clone());
        }
        Mode::InteractiveEditor
    }
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    use anyhow::Context;
    let config = Config::load_with_overrides(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    Ok(match cli.mode() {
        Mode::InteractiveEditor => run_interactive_editor(&config, &cli),
        Mode::Query(text) => run_query(&config, &text),
        Mode::Print(file) => run_print(&config, &file, &cli),
        Mode::Hook(name) => run_hook(&config, &name),
        Mode::Audit(dir) => run_audit(&config, &dir, &cli),
        Mode::Tasks(dir) => run_tasks(&config, &dir, &cli),
        Mode::Docs(dir) => run_docs(&config, &dir, &cli),
        Mode::Sync(_dir) => {
            // Spec §6.1 names this mode but the wider spec body never
            // elaborates a git-sync contract beyond the CLI table row; no
            // behavior is specified to implement against, so this errors
            // explicitly rather than inventing sync semantics.
            tracing::error!("--sync has no elaborated contract; not implemented");
            ExitCode::FAILURE
        }
    })
}

fn claude_cli(config: &Config) -> String {
    config
        .provider("claude")
        .map(|p| p.command.clone())
        .unwrap_or_else(|| "claude".to_string())
}

fn run_query(config: &Config, text: &str) -> ExitCode {
    let driver = AgentDriver::new(Provider::Claude, claude_cli(config));
    let agent_config = Provider::Claude.default_config().with_new_session_id();
    match driver.run(CommandInstruction::Text(text.to_string()), None, None, &agent_config) {
        Ok(outcome) => {
            println!("{}", outcome.output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            ExitCode::FAILURE
        }
    }
}

fn run_print(config: &Config, file: &PathBuf, cli: &Cli) -> ExitCode {
    if !file.is_file() {
        tracing::error!(file = %file.display(), "print mode file not found");
        return ExitCode::FAILURE;
    }
    let mut stdin_data = String::new();
    if std::io::stdin().read_to_string(&mut stdin_data).is_err() {
        stdin_data.clear();
    }
    if let Some(prefix) = &cli.user_instruction {
        stdin_data = format!("{prefix}\n{stdin_data}");
    }

    let driver = AgentDriver::new(Provider::Claude, claude_cli(config));
    let agent_config = Provider::Claude.default_config().with_new_session_id();
    let stdin_arg = if stdin_data.is_empty() { None } else { Some(stdin_data.as_str()) };
    match driver.run(CommandInstruction::File(file.clone()), stdin_arg, cli.root_dir.as_deref(), &agent_config) {
        Ok(outcome) => {
            println!("{}", outcome.output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "print mode failed");
            ExitCode::FAILURE
        }
    }
}

fn run_interactive_editor(config: &Config, cli: &Cli) -> ExitCode {
    // The TTY editor UI itself is an external collaborator (spec §1); this
    // binary only owns the "send content to agent, print reply" half.
    let mut content = String::new();
    if std::io::stdin().read_to_string(&mut content).is_err() {
        tracing::error!("failed to read interactive editor input from stdin");
        return ExitCode::FAILURE;
    }
    if let Some(prefix) = &cli.user_instruction {
        content = format!("{prefix}\n{content}");
    }
    run_query(config, &content)
}

fn run_hook(config: &Config, name: &str) -> ExitCode {
    // `NAME` is an operator-chosen label from the hooks configuration file
    // (spec §6.1); the dispatcher routes on the event's own
    // `hook_event_name` field, not on this label. An empty label is the one
    // case this binary itself can call out as unknown.
    if name.is_empty() {
        tracing::error!("unknown hook name: empty");
        return ExitCode::FAILURE;
    }

    let event = match HookEvent::from_stdin() {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse hook input");
            let result = agent_harness::hooks::decision::HookResult::block(e.to_string());
            println!("{}", result.to_json(HookEventName::Stop));
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = HookDispatcher::new(config);
    let result = dispatcher.dispatch(event.clone());
    let body = result.to_json(event.hook_event_name);
    println!("{body}");
    ExitCode::SUCCESS
}

fn run_audit(config: &Config, dir: &PathBuf, cli: &Cli) -> ExitCode {
    let output_dir = config.root.join("docs").join("audit");
    let date_stamp = chrono::Utc::now().format("%d.%m.%Y").to_string();
    let outcome = audit::run_audit(config, dir, &output_dir, &date_stamp, cli.parallel, cli.retry_errors);
    if outcome.failed_or_timed_out > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_tasks(config: &Config, dir: &PathBuf, cli: &Cli) -> ExitCode {
    let output_dir = config.root.join("docs").join("tasks");
    let date_stamp = chrono::Utc::now().format("%d.%m.%Y").to_string();
    let outcome = tasks::run_tasks(config, dir, &output_dir, &date_stamp, cli.parallel);
    let failed_or_timed_out = outcome.total - outcome.completed - outcome.feedback;
    if failed_or_timed_out > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_docs(config: &Config, dir: &PathBuf, cli: &Cli) -> ExitCode {
    let output_dir = config.root.join("docs").join("maintenance");
    let date_stamp = chrono::Utc::now().format("%d.%m.%Y").to_string();
    let outcome = docs::run_docs(config, dir, &output_dir, &date_stamp, cli.parallel);
    if outcome.failed_or_timed_out > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
