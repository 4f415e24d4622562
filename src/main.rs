// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};

use agentrt_core::{Agent, AgentConfig, AgentRuntimeContext, CoreSubagentRunner, ImageRef, StreamEvent};
use agentrt_model::catalog::ModelCatalogEntry;
use agentrt_tools::{
    CodeInterpreterTool, EditTool, GlobTool, GrepTool, ImageGenerationTool, ListTool, QuestionRegistry,
    QuestionTool, ReadTool, ShellTool, TaskTool, ToolRegistry, WebFetchTool, WebSearchTool, WriteTool,
    BUILTIN_READ_ONLY,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(cmd) = &cli.command {
        return match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                Ok(())
            }
            Commands::ShowConfig => {
                let config = agentrt_config::load(cli.config.as_deref())?;
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                Ok(())
            }
            Commands::ListModels { provider, refresh, json } => {
                let config = agentrt_config::load(cli.config.as_deref())?;
                list_models_cmd(&config, provider.as_deref(), *refresh, *json).await
            }
            Commands::ListProviders { verbose, json } => list_providers_cmd(*verbose, *json),
        };
    }

    let config = agentrt_config::load(cli.config.as_deref())?;
    run_session(cli, config).await
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Tracing goes to stderr; stdout is reserved for control-channel events.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

// ── Stdio control-channel session ─────────────────────────────────────────

/// Inbound control messages (§6). Tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Init {
        #[serde(default)]
        workspace_root: Option<PathBuf>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        deep_thinking_default: Option<bool>,
    },
    UserMessage {
        content: String,
        #[serde(default)]
        images: Vec<String>,
        #[serde(default)]
        deep_thinking: Option<bool>,
        #[serde(default)]
        thinking_budget: Option<u32>,
    },
    Cancel,
    Answer {
        questionnaire_id: String,
        answers: Vec<String>,
    },
}

/// Runs the stdio reference transport: reads newline-delimited JSON control
/// messages from stdin, drives a single [`Agent`] session, and writes one
/// JSON [`StreamEvent`] per line to stdout. The real transport (WebSocket,
/// `BACKEND_WS_URL`/`CONTAINER_TOKEN`) is out of scope — this binary exists
/// to exercise the same `init` → `user_message` → event-stream contract a
/// session-glue layer would drive it through.
async fn run_session(cli: Cli, config: agentrt_config::Config) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    let question_registry = Arc::new(QuestionRegistry::new());
    let mut agent: Option<Agent> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: ControlMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                write_event(&mut stdout, &StreamEvent::error("agent_error", format!("malformed control message: {e}"))).await?;
                continue;
            }
        };

        match msg {
            ControlMessage::Init { workspace_root, model, deep_thinking_default } => {
                match init_agent(&cli, &config, workspace_root, model, deep_thinking_default, question_registry.clone()) {
                    Ok(a) => agent = Some(a),
                    Err(e) => {
                        write_event(&mut stdout, &StreamEvent::error("agent_error", format!("init failed: {e}"))).await?;
                    }
                }
            }
            ControlMessage::UserMessage { content, images, deep_thinking, thinking_budget } => {
                let Some(agent) = agent.as_mut() else {
                    write_event(&mut stdout, &StreamEvent::error("not_initialized", "no init message received yet")).await?;
                    continue;
                };
                let images: Vec<ImageRef> = images.into_iter().map(|url| ImageRef { url }).collect();
                let (tx, mut rx) = mpsc::channel::<StreamEvent>(256);
                let run = agent.handle_message(&content, images, deep_thinking, thinking_budget, tx);
                tokio::pin!(run);

                loop {
                    tokio::select! {
                        res = &mut run => {
                            if let Err(e) = res {
                                error!(error = %e, "agent turn failed");
                                write_event(&mut stdout, &StreamEvent::error("agent_error", e.to_string())).await?;
                            }
                            break;
                        }
                        ev = rx.recv() => {
                            match ev {
                                Some(ev) => write_event(&mut stdout, &ev).await?,
                                None => break,
                            }
                        }
                    }
                }
                // Drain any events buffered after the run future completed.
                while let Ok(ev) = rx.try_recv() {
                    write_event(&mut stdout, &ev).await?;
                }
            }
            ControlMessage::Cancel => {
                if let Some(agent) = agent.as_ref() {
                    agent.cancel_flag().store(true, std::sync::atomic::Ordering::SeqCst);
                }
                // A cancel with no session yet, or no in-flight turn, is a
                // no-op — there is nothing to interrupt (§7).
            }
            ControlMessage::Answer { questionnaire_id, answers } => {
                // `answer` is idempotent: `QuestionRegistry::answer` returns
                // false for an unknown/already-resolved id and we ignore it.
                let _ = question_registry.answer(&questionnaire_id, answers);
            }
        }
    }

    Ok(())
}

async fn write_event(stdout: &mut (impl AsyncWriteExt + Unpin), ev: &StreamEvent) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(ev).context("serializing stream event")?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

fn init_agent(
    cli: &Cli,
    config: &agentrt_config::Config,
    workspace_root_override: Option<PathBuf>,
    model_override: Option<String>,
    deep_thinking_default: Option<bool>,
    question_registry: Arc<QuestionRegistry>,
) -> anyhow::Result<Agent> {
    let workspace_root = workspace_root_override
        .or_else(|| cli.workspace_root.clone())
        .or_else(|| agentrt_runtime::find_project_root().ok())
        .unwrap_or_else(|| PathBuf::from("/workspace"));

    let model_cfg = match &model_override {
        Some(m) => agentrt_model::resolve_model_from_config(config, m),
        None => config.model.clone(),
    };
    let model: Arc<dyn agentrt_model::ModelProvider> = Arc::from(agentrt_model::from_config(&model_cfg)?);
    let max_context_tokens = model.catalog_context_window().unwrap_or(128_000) as usize;

    let runtime_config = Arc::new(config.agent.clone());

    let project_root = agentrt_runtime::find_project_root().ok();
    let git_context_note =
        project_root.as_ref().and_then(|root| agentrt_runtime::collect_git_context(root).to_prompt_section());
    let ci_context_note = agentrt_runtime::detect_ci_context().to_prompt_section();
    let project_context_file =
        project_root.as_ref().and_then(|root| agentrt_runtime::load_project_context_file(root));

    let runtime = AgentRuntimeContext {
        project_root: project_root.clone(),
        git_context_note,
        ci_context_note,
        project_context_file,
        append_system_prompt: None,
        system_prompt_override: None,
    };

    let full_registry = build_full_registry(config, &workspace_root, model.clone(), runtime_config.clone(), &runtime, question_registry);

    let mut agent_config = AgentConfig::new(uuid::Uuid::new_v4().to_string(), workspace_root, model_cfg.name.clone());
    if let Some(deep_thinking_default) = deep_thinking_default {
        agent_config.deep_thinking_default = deep_thinking_default;
    }

    Ok(Agent::new(model, Arc::new(full_registry), agent_config, runtime_config, runtime, max_context_tokens))
}

/// Builds the full tool registry plus the read-only registry handed to
/// subagents, then wires the latter into a [`TaskTool`] registered on the
/// former.
fn build_full_registry(
    config: &agentrt_config::Config,
    workspace_root: &std::path::Path,
    model: Arc<dyn agentrt_model::ModelProvider>,
    runtime_config: Arc<agentrt_config::RuntimeConfig>,
    runtime: &AgentRuntimeContext,
    question_registry: Arc<QuestionRegistry>,
) -> ToolRegistry {
    let workspace_root = workspace_root.to_path_buf();

    let mut read_only = ToolRegistry::new();
    for name in BUILTIN_READ_ONLY {
        register_by_name(&mut read_only, name, &workspace_root, config);
    }

    // Subagents are inert placeholders at construction time — their real
    // config/runtime is filled in per-call by `CoreSubagentRunner` from the
    // parent `Agent`'s own config, so a fixed conversation id here is fine.
    let subagent_runner = Arc::new(CoreSubagentRunner::new(
        model,
        Arc::new(read_only),
        runtime_config,
        AgentConfig::new("subagent-parent", workspace_root.clone(), "inherited"),
        runtime.clone(),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(ReadTool { workspace_root: workspace_root.clone() });
    registry.register(WriteTool { workspace_root: workspace_root.clone() });
    registry.register(EditTool { workspace_root: workspace_root.clone() });
    registry.register(GlobTool { workspace_root: workspace_root.clone() });
    registry.register(GrepTool { workspace_root: workspace_root.clone() });
    registry.register(ListTool { workspace_root: workspace_root.clone() });
    registry.register(ShellTool { timeout_secs: config.tools.timeout_secs });
    registry.register(WebFetchTool);
    registry.register(WebSearchTool { api_key: config.tools.web.search.api_key.clone() });
    registry.register(CodeInterpreterTool::new(workspace_root.clone()));
    registry.register(ImageGenerationTool { workspace_root: workspace_root.clone() });
    registry.register(QuestionTool::new(question_registry));
    registry.register(TaskTool::new(subagent_runner));
    registry
}

fn register_by_name(registry: &mut ToolRegistry, name: &str, workspace_root: &std::path::Path, config: &agentrt_config::Config) {
    let workspace_root = workspace_root.to_path_buf();
    match name {
        "read" => registry.register(ReadTool { workspace_root }),
        "list" => registry.register(ListTool { workspace_root }),
        "glob" => registry.register(GlobTool { workspace_root }),
        "grep" => registry.register(GrepTool { workspace_root }),
        "web_fetch" => registry.register(WebFetchTool),
        "web_search" => registry.register(WebSearchTool { api_key: config.tools.web.search.api_key.clone() }),
        other => debug!(tool = other, "unknown builtin read-only tool name, skipping"),
    }
}

// ── `list-models` / `list-providers` subcommands ──────────────────────────

async fn list_models_cmd(
    config: &agentrt_config::Config,
    provider_filter: Option<&str>,
    refresh: bool,
    as_json: bool,
) -> anyhow::Result<()> {
    if let Some(prov) = provider_filter {
        if agentrt_model::get_driver(prov).is_none() {
            eprintln!("Unknown provider: {prov:?}");
            eprintln!("\nAvailable providers (run `agentrt list-providers` for details):");
            for d in agentrt_model::list_drivers() {
                eprintln!("  {:20} {}", d.id, d.name);
            }
            anyhow::bail!("Invalid provider: {prov}");
        }
    }

    let entries: Vec<ModelCatalogEntry> = if refresh {
        let model_cfg = if let Some(prov) = provider_filter {
            let mut c = config.model.clone();
            c.provider = prov.to_string();
            c
        } else {
            config.model.clone()
        };
        let model = agentrt_model::from_config(&model_cfg)?;
        let mut live = model.list_models().await?;
        if let Some(prov) = provider_filter {
            live.retain(|e| e.provider == prov);
        }
        live
    } else {
        let mut all = agentrt_model::catalog::static_catalog();
        if let Some(prov) = provider_filter {
            all.retain(|e| e.provider == prov);
        }
        all.sort_by(|a, b| a.provider.cmp(&b.provider).then(a.id.cmp(&b.id)));
        all
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No models found.");
        return Ok(());
    }

    let id_w = entries.iter().map(|e| e.id.len()).max().unwrap_or(10).max(10);
    let prov_w = entries.iter().map(|e| e.provider.len()).max().unwrap_or(8).max(8);

    println!(
        "{:<id_w$}  {:<prov_w$}  {:>12}  {:>16}  DESCRIPTION",
        "ID",
        "PROVIDER",
        "CTX WINDOW",
        "MAX OUT TOKENS",
        id_w = id_w,
        prov_w = prov_w,
    );
    println!("{}", "-".repeat(id_w + prov_w + 50));

    for e in &entries {
        let ctx = if e.context_window == 0 { "  -".to_string() } else { format!("{:>12}", e.context_window) };
        let max_out = if e.max_output_tokens == 0 { "  -".to_string() } else { format!("{:>16}", e.max_output_tokens) };
        println!(
            "{:<id_w$}  {:<prov_w$}  {}  {}  {}",
            e.id,
            e.provider,
            ctx,
            max_out,
            e.description,
            id_w = id_w,
            prov_w = prov_w,
        );
    }
    println!("\nTotal: {} model(s)", entries.len());
    Ok(())
}

fn list_providers_cmd(verbose: bool, as_json: bool) -> anyhow::Result<()> {
    let drivers = agentrt_model::list_drivers();

    if as_json {
        #[derive(serde::Serialize)]
        struct ProviderJson {
            id: &'static str,
            name: &'static str,
            description: &'static str,
            default_api_key_env: Option<&'static str>,
            default_base_url: Option<&'static str>,
            requires_api_key: bool,
        }
        let rows: Vec<ProviderJson> = drivers
            .iter()
            .map(|d| ProviderJson {
                id: d.id,
                name: d.name,
                description: d.description,
                default_api_key_env: d.default_api_key_env,
                default_base_url: d.default_base_url,
                requires_api_key: d.requires_api_key,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Supported Model Providers ({} total)\n", drivers.len());

    if verbose {
        for d in drivers {
            println!("  {} — {}", d.id, d.name);
            println!("    {}", d.description);
            if let Some(env) = d.default_api_key_env {
                println!("    API key env : {env}");
            }
            if let Some(url) = d.default_base_url {
                println!("    Default URL : {url}");
            }
            if !d.requires_api_key {
                println!("    Auth        : none required");
            }
            println!();
        }
    } else {
        let id_w = drivers.iter().map(|d| d.id.len()).max().unwrap_or(10).max(10);
        let name_w = drivers.iter().map(|d| d.name.len()).max().unwrap_or(8).max(8);
        println!("{:<id_w$}  {:<name_w$}  DESCRIPTION", "ID", "NAME");
        println!("{}", "-".repeat(id_w + name_w + 40));
        for d in drivers {
            println!("{:<id_w$}  {:<name_w$}  {}", d.id, d.name, d.description);
        }
        println!("\nUse `agentrt list-providers --verbose` for API key and URL details.");
        println!("Use `agentrt list-models --provider <ID>` to see models for a specific provider.");
    }
    Ok(())
}
