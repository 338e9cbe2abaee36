mod classify;
mod cli;
mod config;
mod console;
mod errors;
mod execution;
mod generation;
mod llm;
mod orchestrator;
mod printer;
mod process;
mod render;
mod role;
mod session;
mod utils;

use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

use crate::classify::ExecutionResult;
use crate::config::Config;
use crate::errors::PipelineResult;
use crate::execution::{Launcher, PythonLauncher};
use crate::generation::CodeGenerator;
use crate::orchestrator::{CycleReport, Orchestrator};
use crate::printer::TerminalPrinter;
use crate::render::{ArtifactStore, Container, SandboxRenderer};
use crate::session::RuntimeSession;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose { "codecanvas=debug" } else { "codecanvas=warn" }.to_string()
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cfg = Config::load();
    debug!(rc = %cfg.config_path.display(), "configuration loaded");

    // stdin handling (pipe support)
    let stdin_is_tty = io::stdin().is_terminal();
    let mut prompt_from_stdin = String::new();
    if !stdin_is_tty && !args.repl {
        io::stdin().read_to_string(&mut prompt_from_stdin)?;
    }
    let arg_prompt = args.prompt.clone().unwrap_or_default();
    let prompt = if !prompt_from_stdin.trim().is_empty() && !arg_prompt.is_empty() {
        format!("{}\n\n{}", prompt_from_stdin.trim(), arg_prompt)
    } else if !prompt_from_stdin.trim().is_empty() {
        prompt_from_stdin.trim().to_string()
    } else {
        arg_prompt
    };

    let store = open_store(&cfg, args.out.as_deref())?;
    info!(dir = %store.dir().display(), "artifact store ready");
    let renderer = SandboxRenderer::new(store, cfg.export_grace());
    let python = cfg.get("PYTHON_BIN").unwrap_or_else(|| "python3".to_string());
    let session = RuntimeSession::new(PythonLauncher::new(python), cfg.capabilities(), cfg.execution_timeout());
    let generator = generation::from_config(&cfg, args.model.as_deref(), args.temperature)?;
    let mut orchestrator = Orchestrator::new(generator, session, renderer, cfg.generation_delay());

    let printer = TerminalPrinter { color: io::stdout().is_terminal() && !args.json };
    let mut container = Container::new();

    if args.repl {
        return repl(&mut orchestrator, &mut container, &printer, &args).await;
    }

    let outcome = match &args.source {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            orchestrator.run_source(&source, &mut container).await.map(Some)
        }
        None => {
            if prompt.trim().is_empty() {
                bail!("Provide a request as PROMPT, via stdin, or a file with --source");
            }
            orchestrator.run_prompt(&prompt, &mut container).await
        }
    };

    let failed = finish_cycle(&mut orchestrator, &container, &printer, &args, outcome)?;
    orchestrator.renderer_mut().settle().await;
    if let Some(e) = failed {
        bail!(e);
    }
    Ok(())
}

/// Present one cycle: terminal view or JSON, host page, export actions.
/// Returns the user-facing error message when the cycle failed.
fn finish_cycle<G: CodeGenerator, L: Launcher>(
    orchestrator: &mut Orchestrator<G, L>,
    container: &Container,
    printer: &TerminalPrinter,
    args: &cli::Cli,
    outcome: PipelineResult<Option<CycleReport>>,
) -> Result<Option<String>> {
    let (report, failure) = match outcome {
        Ok(report) => (report, None),
        Err(e) => (None, Some(e.user_message())),
    };

    let elapsed = report.as_ref().map(|r| r.elapsed);
    let source = report.as_ref().map(|r| r.source.as_str()).or(orchestrator.last_generated());

    if args.json {
        let result = match (&report, &failure) {
            (Some(r), _) => r.result.clone(),
            (None, Some(message)) => ExecutionResult::error(message.clone()),
            (None, None) => return Ok(None),
        };
        println!("{}", printer::json_report(&result, source, elapsed)?);
    } else {
        if let Some(code) = orchestrator.last_generated() {
            printer.source(code);
        }
        printer.console(orchestrator.console());
        printer.container(container);
        printer.status(orchestrator.status(), elapsed);
    }

    if let Some(page) = &args.out {
        let page_dir = page.parent().map(Path::to_path_buf).unwrap_or_default();
        let html = container.to_html_page(
            &orchestrator.status().message,
            elapsed,
            source,
            orchestrator.console(),
            Some(&page_dir),
        );
        std::fs::write(page, html).with_context(|| format!("failed to write {}", page.display()))?;
        info!(path = %page.display(), "host page written");
    }

    if failure.is_none() && args.wants_export() {
        export(orchestrator, args)?;
    }
    Ok(failure)
}

fn export<G: CodeGenerator, L: Launcher>(orchestrator: &mut Orchestrator<G, L>, args: &cli::Cli) -> Result<()> {
    let renderer = orchestrator.renderer_mut();
    if renderer.current_plot().is_none() {
        warn!("export requested but the result is not a plot");
        eprintln!("Nothing to export: the result is not a plot");
        return Ok(());
    }
    if let Some(dir) = &args.save_plot {
        let path = renderer.save_to_file(dir)?;
        eprintln!("Saved {}", path.display());
    }
    if args.copy_ref {
        println!("{}", renderer.copy_reference()?);
    }
    if args.open {
        renderer.open_external()?;
    }
    Ok(())
}

async fn repl<G: CodeGenerator, L: Launcher>(
    orchestrator: &mut Orchestrator<G, L>,
    container: &mut Container,
    printer: &TerminalPrinter,
    args: &cli::Cli,
) -> Result<()> {
    let ready = orchestrator.prepare().await;
    printer.status(orchestrator.status(), None);
    if let Err(e) = ready {
        warn!(error = %e, "runtime not ready, retrying on first request");
    }

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    loop {
        if interactive {
            eprint!(">>> ");
        }
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }
        let outcome = match line.strip_prefix(":source ") {
            Some(path) => match std::fs::read_to_string(PathBuf::from(path.trim())) {
                Ok(source) => orchestrator.run_source(&source, container).await.map(Some),
                Err(e) => {
                    eprintln!("failed to read {}: {}", path.trim(), e);
                    continue;
                }
            },
            None => orchestrator.run_prompt(line, container).await,
        };
        let blank = matches!(outcome, Ok(None));
        if blank {
            printer.status(orchestrator.status(), None);
            continue;
        }
        // a failed export or page write ends this request, not the session
        if let Err(e) = finish_cycle(orchestrator, container, printer, args, outcome) {
            warn!(error = %e, "request output failed");
            eprintln!("Error: {:#}", e);
        }
    }
    orchestrator.renderer_mut().settle().await;
    Ok(())
}

/// Persistent store next to the host page when one is written, otherwise
/// `ARTIFACT_DIR` or a private temporary directory.
fn open_store(cfg: &Config, out: Option<&Path>) -> Result<ArtifactStore> {
    let dir = match out {
        Some(page) => {
            let stem = page
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "codecanvas".to_string());
            Some(page.parent().unwrap_or(Path::new("")).join(format!("{}_files", stem)))
        }
        None => cfg.get_path("ARTIFACT_DIR"),
    };
    match dir {
        Some(dir) => ArtifactStore::in_dir(&dir)
            .with_context(|| format!("failed to create artifact directory {}", dir.display())),
        None => ArtifactStore::temporary().context("failed to create temporary artifact directory"),
    }
}
