//! Runtime session: owns the interpreter handle, its capabilities and the
//! captured standard output.
//!
//! One session is created per process and handed to the orchestrator. The
//! session is either fully ready (`initialized`, handle present, every
//! required capability loaded) or not ready at all; a failed initialization
//! or a stopped interpreter always drops it back to the not-ready state so a
//! later `initialize()` can start over.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::execution::{Interpreter, InterpreterError, Launcher, RawValue};

#[cfg(test)]
pub mod testing;

/// Helper library installed into the interpreter's global namespace.
pub const PRELUDE: &str = include_str!("prelude.py");
pub(crate) const RESET_CAPTURE: &str = "_stdout_capture.content = ''";
pub(crate) const READ_CAPTURE: &str = "_stdout_capture.content";

/// What one `run_source` call produced. Consumed by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub raw_value: RawValue,
    pub captured_output: String,
    pub threw: bool,
    pub error_message: Option<String>,
    /// Set when the source was markup and never reached the interpreter.
    pub markup_source: Option<String>,
}

impl ExecutionOutcome {
    pub fn value(raw_value: RawValue, captured_output: String) -> Self {
        Self { raw_value, captured_output, threw: false, error_message: None, markup_source: None }
    }

    pub fn raised(message: String, captured_output: String) -> Self {
        Self {
            raw_value: RawValue::Undefined,
            captured_output,
            threw: true,
            error_message: Some(message),
            markup_source: None,
        }
    }

    pub fn markup(source: &str) -> Self {
        Self {
            raw_value: RawValue::Undefined,
            captured_output: String::new(),
            threw: false,
            error_message: None,
            markup_source: Some(source.to_string()),
        }
    }
}

/// Source text that is a markup document or fragment rather than a script.
pub fn is_markup_source(source: &str) -> bool {
    let t = source.trim_start();
    if t.starts_with("<!") {
        return true;
    }
    let mut chars = t.chars();
    if chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return true;
    }
    t.to_ascii_lowercase().contains("<body")
}

pub struct RuntimeSession<L: Launcher> {
    launcher: L,
    handle: Option<L::Handle>,
    required: Vec<String>,
    loaded: BTreeSet<String>,
    initialized: bool,
    output_buffer: String,
    deadline: Duration,
}

impl<L: Launcher> RuntimeSession<L> {
    pub fn new(launcher: L, capabilities: Vec<String>, deadline: Duration) -> Self {
        Self {
            launcher,
            handle: None,
            required: capabilities,
            loaded: BTreeSet::new(),
            initialized: false,
            output_buffer: String::new(),
            deadline,
        }
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[cfg(test)]
    pub fn loaded_capabilities(&self) -> &BTreeSet<String> {
        &self.loaded
    }

    /// Output captured by the most recent `run_source` call.
    #[cfg(test)]
    pub fn output_buffer(&self) -> &str {
        &self.output_buffer
    }

    /// Start the interpreter, load capabilities and install the helper library.
    /// Returns immediately when the session is already ready.
    pub async fn initialize(&mut self) -> PipelineResult<()> {
        if self.initialized {
            return Ok(());
        }
        let started = Instant::now();
        let mut handle = self.launcher.launch().await.map_err(|e| {
            PipelineError::RuntimeInitialization {
                capability: "interpreter".to_string(),
                reason: e.to_string(),
            }
        })?;

        self.loaded.clear();
        for cap in &self.required {
            debug!(capability = %cap, "loading capability");
            if let Err(e) = handle.load_capability(cap).await {
                warn!(capability = %cap, error = %e, "capability failed to load");
                handle.shutdown().await;
                self.loaded.clear();
                return Err(PipelineError::RuntimeInitialization {
                    capability: cap.clone(),
                    reason: e.to_string(),
                });
            }
            self.loaded.insert(cap.clone());
        }

        if let Err(e) = handle.run(PRELUDE).await {
            handle.shutdown().await;
            self.loaded.clear();
            return Err(PipelineError::RuntimeInitialization {
                capability: "prelude".to_string(),
                reason: e.to_string(),
            });
        }

        self.handle = Some(handle);
        self.initialized = true;
        info!(
            capabilities = self.loaded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "runtime session ready"
        );
        Ok(())
    }

    /// Run one piece of source text. Markup is handed back untouched; anything
    /// else is evaluated under the session deadline.
    pub async fn run_source(&mut self, source: &str) -> PipelineResult<ExecutionOutcome> {
        if !self.initialized {
            return Err(PipelineError::RuntimeUninitialized);
        }
        self.output_buffer.clear();
        let Some(handle) = self.handle.as_mut() else {
            return Err(PipelineError::RuntimeUninitialized);
        };

        if let Err(e) = handle.run(RESET_CAPTURE).await {
            return Err(self.fail(e).await);
        }

        if is_markup_source(source) {
            debug!("source is markup, skipping evaluation");
            return Ok(ExecutionOutcome::markup(source));
        }

        let evaluated = tokio::time::timeout(self.deadline, handle.eval(source)).await;
        let evaluated = match evaluated {
            Ok(r) => r,
            Err(_) => {
                warn!(deadline_s = self.deadline.as_secs(), "evaluation deadline exceeded, stopping interpreter");
                self.teardown().await;
                return Err(PipelineError::ExecutionTimeout(self.deadline));
            }
        };

        // A raised exception still leaves whatever was printed before it.
        let captured = match handle.eval(READ_CAPTURE).await {
            Ok(RawValue::Str(s)) => s,
            Ok(_) => String::new(),
            Err(e) => return Err(self.fail(e).await),
        };
        self.output_buffer = captured;

        match evaluated {
            Ok(value) => Ok(ExecutionOutcome::value(value, self.output_buffer.clone())),
            Err(InterpreterError::Raised(msg)) => {
                debug!(error = %msg, "script raised");
                Ok(ExecutionOutcome::raised(msg, self.output_buffer.clone()))
            }
            Err(e @ InterpreterError::Transport(_)) => Err(self.fail(e).await),
        }
    }

    async fn fail(&mut self, err: InterpreterError) -> PipelineError {
        warn!(error = %err, "interpreter failure, resetting session");
        self.teardown().await;
        PipelineError::Interpreter(err.to_string())
    }

    /// Stop the interpreter and return to the not-ready state.
    pub async fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.shutdown().await;
        }
        self.loaded.clear();
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeEval, FakeLauncher};
    use super::*;

    fn session(launcher: FakeLauncher) -> RuntimeSession<FakeLauncher> {
        RuntimeSession::new(
            launcher,
            vec!["numpy".into(), "pandas".into(), "matplotlib".into(), "sympy".into()],
            Duration::from_secs(5),
        )
    }

    #[test]
    fn markup_source_detection() {
        assert!(is_markup_source("<div>hi</div>"));
        assert!(is_markup_source("  <!DOCTYPE html><html></html>"));
        assert!(is_markup_source("<html><body>x</body></html>"));
        assert!(is_markup_source("text before <BODY>x</BODY>"));
        assert!(!is_markup_source("print('<div>')"));
        assert!(!is_markup_source("x = 1 < 2"));
        assert!(!is_markup_source("<= nonsense"));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let launcher = FakeLauncher::default();
        let state = launcher.state();
        let mut s = session(launcher);

        s.initialize().await.unwrap();
        s.initialize().await.unwrap();

        let st = state.lock().unwrap();
        assert_eq!(st.launches, 1);
        assert_eq!(st.loads, vec!["numpy", "pandas", "matplotlib", "sympy"]);
        assert!(st.prelude_installed);
        drop(st);
        assert!(s.is_initialized());
        assert_eq!(s.loaded_capabilities().len(), 4);
    }

    #[tokio::test]
    async fn failed_capability_leaves_session_retryable() {
        let launcher = FakeLauncher::default().failing_capability("sympy");
        let state = launcher.state();
        let mut s = session(launcher);

        let err = s.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RuntimeInitialization { ref capability, .. } if capability == "sympy"
        ));
        assert!(!s.is_initialized());
        assert!(s.loaded_capabilities().is_empty());

        state.lock().unwrap().failing_capability = None;
        s.initialize().await.unwrap();
        assert!(s.is_initialized());
        assert_eq!(state.lock().unwrap().launches, 2);
    }

    #[tokio::test]
    async fn run_before_initialize_is_rejected() {
        let mut s = session(FakeLauncher::default());
        assert_eq!(s.run_source("1 + 1").await.unwrap_err(), PipelineError::RuntimeUninitialized);
    }

    #[tokio::test]
    async fn markup_is_not_evaluated() {
        let launcher = FakeLauncher::default();
        let state = launcher.state();
        let mut s = session(launcher);
        s.initialize().await.unwrap();

        let outcome = s.run_source("<div>hi</div>").await.unwrap();
        assert_eq!(outcome.markup_source.as_deref(), Some("<div>hi</div>"));
        assert!(state.lock().unwrap().evaluated.is_empty());
    }

    #[tokio::test]
    async fn output_buffer_is_reset_every_call() {
        let launcher = FakeLauncher::default().with_script(|code| match code {
            "print('first')" => FakeEval::printed("first\n"),
            _ => FakeEval::value(RawValue::Undefined),
        });
        let mut s = session(launcher);
        s.initialize().await.unwrap();

        let first = s.run_source("print('first')").await.unwrap();
        assert_eq!(first.captured_output, "first\n");
        assert_eq!(s.output_buffer(), "first\n");

        let second = s.run_source("x = 2").await.unwrap();
        assert_eq!(second.captured_output, "");
        assert_eq!(s.output_buffer(), "");
    }

    #[tokio::test]
    async fn raised_script_keeps_session_usable() {
        let launcher = FakeLauncher::default().with_script(|code| match code {
            "1/0" => FakeEval::raises("ZeroDivisionError: division by zero"),
            _ => FakeEval::value(RawValue::Str("ok".into())),
        });
        let mut s = session(launcher);
        s.initialize().await.unwrap();

        let bad = s.run_source("1/0").await.unwrap();
        assert!(bad.threw);
        assert_eq!(bad.error_message.as_deref(), Some("ZeroDivisionError: division by zero"));
        assert!(s.is_initialized());

        let good = s.run_source("'ok'").await.unwrap();
        assert!(!good.threw);
        assert_eq!(good.raw_value, RawValue::Str("ok".into()));
    }

    #[tokio::test]
    async fn deadline_stops_runaway_script() {
        let launcher = FakeLauncher::default().with_script(|code| match code {
            "while True: pass" => FakeEval::hang(),
            _ => FakeEval::value(RawValue::Undefined),
        });
        let state = launcher.state();
        let mut s = RuntimeSession::new(launcher, vec![], Duration::from_millis(50));
        s.initialize().await.unwrap();

        let err = s.run_source("while True: pass").await.unwrap_err();
        assert_eq!(err, PipelineError::ExecutionTimeout(Duration::from_millis(50)));
        assert!(!s.is_initialized());
        assert_eq!(state.lock().unwrap().shutdowns, 1);

        s.initialize().await.unwrap();
        assert!(s.run_source("x = 1").await.is_ok());
    }

    #[tokio::test]
    async fn transport_failure_resets_session() {
        let launcher = FakeLauncher::default().with_script(|_| FakeEval::transport("interpreter process exited"));
        let mut s = session(launcher);
        s.initialize().await.unwrap();

        let err = s.run_source("x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Interpreter(_)));
        assert!(!s.is_initialized());
    }
}
