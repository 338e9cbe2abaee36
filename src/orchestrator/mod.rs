//! Orchestrator: generation → execution → classification → rendering, one
//! request at a time.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::classify::{classify, ExecutionResult, ResultKind};
use crate::console::ConsoleLog;
use crate::errors::{PipelineError, PipelineResult};
use crate::execution::Launcher;
use crate::generation::CodeGenerator;
use crate::render::{Container, Presentation, SandboxRenderer};
use crate::session::RuntimeSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Generating,
    Executing,
    Rendering,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Info,
    Loading,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub tone: StatusTone,
}

/// Single-flight control: the trigger is disabled while a cycle runs.
#[derive(Debug)]
pub struct TriggerControl {
    enabled: bool,
    state: CycleState,
    trace: Vec<CycleState>,
}

impl Default for TriggerControl {
    fn default() -> Self {
        Self { enabled: true, state: CycleState::Idle, trace: Vec::new() }
    }
}

impl TriggerControl {
    pub fn engage(&mut self) -> PipelineResult<TriggerGuard<'_>> {
        if !self.enabled {
            return Err(PipelineError::Busy);
        }
        self.enabled = false;
        self.trace.clear();
        Ok(TriggerGuard { control: self })
    }

    #[cfg(test)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(test)]
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// States visited by the most recent cycle.
    #[cfg(test)]
    pub fn trace(&self) -> &[CycleState] {
        &self.trace
    }
}

/// Re-enables the trigger and returns to idle however the cycle ends.
pub struct TriggerGuard<'a> {
    control: &'a mut TriggerControl,
}

impl TriggerGuard<'_> {
    fn enter(&mut self, state: CycleState) {
        debug!(from = ?self.control.state, to = ?state, "cycle transition");
        self.control.state = state;
        self.control.trace.push(state);
    }
}

impl Drop for TriggerGuard<'_> {
    fn drop(&mut self) {
        self.control.state = CycleState::Idle;
        self.control.trace.push(CycleState::Idle);
        self.control.enabled = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub source: String,
    pub kind: ResultKind,
    pub result: ExecutionResult,
    pub elapsed: Duration,
}

enum CycleInput<'a> {
    Prompt(&'a str),
    Source(&'a str),
}

pub struct Orchestrator<G: CodeGenerator, L: Launcher> {
    generator: G,
    session: RuntimeSession<L>,
    renderer: SandboxRenderer,
    console: ConsoleLog,
    control: TriggerControl,
    status: Status,
    pre_call_delay: Duration,
    generated: Option<String>,
}

impl<G: CodeGenerator, L: Launcher> Orchestrator<G, L> {
    pub fn new(generator: G, session: RuntimeSession<L>, renderer: SandboxRenderer, pre_call_delay: Duration) -> Self {
        Self {
            generator,
            session,
            renderer,
            console: ConsoleLog::new(),
            control: TriggerControl::default(),
            status: Status { message: "Ready".to_string(), tone: StatusTone::Info },
            pre_call_delay,
            generated: None,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    #[cfg(test)]
    pub fn control(&self) -> &TriggerControl {
        &self.control
    }

    #[cfg(test)]
    pub fn session(&self) -> &RuntimeSession<L> {
        &self.session
    }

    /// Code produced by the generator in the latest cycle, kept even when
    /// executing it failed.
    pub fn last_generated(&self) -> Option<&str> {
        self.generated.as_deref()
    }

    pub fn renderer_mut(&mut self) -> &mut SandboxRenderer {
        &mut self.renderer
    }

    /// Bring the runtime up ahead of the first request.
    pub async fn prepare(&mut self) -> PipelineResult<()> {
        self.set_status("Initializing Python runtime...", StatusTone::Loading);
        match self.session.initialize().await {
            Ok(()) => {
                self.set_status("Ready ✨", StatusTone::Success);
                Ok(())
            }
            Err(e) => {
                self.console.error(e.to_string());
                self.set_status(format!("Error: {}", e.user_message()), StatusTone::Error);
                Err(e)
            }
        }
    }

    /// Full cycle for a natural-language prompt. `Ok(None)` when the prompt is blank.
    pub async fn run_prompt(&mut self, prompt: &str, container: &mut Container) -> PipelineResult<Option<CycleReport>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            self.set_status("Enter a request", StatusTone::Warning);
            return Ok(None);
        }
        self.cycle(CycleInput::Prompt(prompt), container).await.map(Some)
    }

    /// Cycle for source text supplied directly, without the generation stage.
    pub async fn run_source(&mut self, source: &str, container: &mut Container) -> PipelineResult<CycleReport> {
        self.cycle(CycleInput::Source(source), container).await
    }

    #[instrument(skip_all)]
    async fn cycle(&mut self, input: CycleInput<'_>, container: &mut Container) -> PipelineResult<CycleReport> {
        let Self { generator, session, renderer, console, control, status, pre_call_delay, generated } = self;
        let mut guard = control.engage()?;

        console.clear();
        *generated = None;
        container.clear();
        container.mount(Presentation::placeholder("💻", "Result will appear here"));
        let started = Instant::now();

        let result: PipelineResult<CycleReport> = async {
            guard.enter(CycleState::Generating);
            let source = match input {
                CycleInput::Prompt(prompt) => {
                    *status = loading("Generating code...");
                    console.info("Generating code...");
                    if !pre_call_delay.is_zero() {
                        tokio::time::sleep(*pre_call_delay).await;
                    }
                    let code = generator.generate(prompt).await?;
                    console.debug(format!("Generated {} characters of code", code.len()));
                    *generated = Some(code.clone());
                    code
                }
                CycleInput::Source(source) => source.to_string(),
            };

            guard.enter(CycleState::Executing);
            *status = loading("Executing code...");
            session.initialize().await?;
            console.info("Executing code...");
            let outcome = session.run_source(&source).await?;
            if outcome.markup_source.is_some() {
                console.info("Markup detected, rendering without execution");
            }

            let classified = classify(&outcome);
            let kind = classified.kind();
            console.debug(format!("Result kind: {}", kind));
            match &classified {
                ExecutionResult::Error { message } => {
                    return Err(PipelineError::ScriptEvaluation(message.clone()));
                }
                ExecutionResult::Plot { .. } => console.success("Plot detected"),
                ExecutionResult::Markup { .. } => console.success("Markup detected"),
                ExecutionResult::Structured { .. } => console.success("Structured value detected"),
                ExecutionResult::Text { .. } if !outcome.captured_output.trim().is_empty() => {
                    console.info("Output captured from stdout")
                }
                _ => {}
            }

            guard.enter(CycleState::Rendering);
            renderer.render(container, classified.clone())?;
            Ok(CycleReport { source, kind, result: classified, elapsed: started.elapsed() })
        }
        .await;

        match result {
            Ok(report) => {
                info!(kind = %report.kind, elapsed_ms = report.elapsed.as_millis() as u64, "cycle finished");
                *status = Status { message: "Done!".to_string(), tone: StatusTone::Success };
                Ok(report)
            }
            Err(e) => {
                guard.enter(CycleState::Error);
                warn!(error = %e, "cycle failed");
                console.error(e.to_string());
                let message = e.user_message();
                *status = Status { message: format!("Error: {}", message), tone: StatusTone::Error };
                renderer.render_error(container, &message);
                Err(e)
            }
        }
    }

    fn set_status(&mut self, message: impl Into<String>, tone: StatusTone) {
        self.status = Status { message: message.into(), tone };
    }
}

fn loading(message: &str) -> Status {
    Status { message: message.to_string(), tone: StatusTone::Loading }
}
