//! In-memory interpreter used by unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{PRELUDE, READ_CAPTURE, RESET_CAPTURE};
use crate::execution::{Interpreter, InterpreterError, Launcher, RawValue};

/// Scripted reaction to one `eval` call.
pub struct FakeEval {
    printed: String,
    result: Result<RawValue, InterpreterError>,
    hang: bool,
}

impl FakeEval {
    pub fn value(v: RawValue) -> Self {
        Self { printed: String::new(), result: Ok(v), hang: false }
    }

    pub fn printed(text: &str) -> Self {
        Self { printed: text.to_string(), result: Ok(RawValue::Undefined), hang: false }
    }

    pub fn printed_with(text: &str, v: RawValue) -> Self {
        Self { printed: text.to_string(), result: Ok(v), hang: false }
    }

    pub fn raises(msg: &str) -> Self {
        Self {
            printed: String::new(),
            result: Err(InterpreterError::Raised(msg.to_string())),
            hang: false,
        }
    }

    pub fn transport(msg: &str) -> Self {
        Self {
            printed: String::new(),
            result: Err(InterpreterError::Transport(msg.to_string())),
            hang: false,
        }
    }

    pub fn hang() -> Self {
        Self { printed: String::new(), result: Ok(RawValue::Undefined), hang: true }
    }
}

type Script = Arc<dyn Fn(&str) -> FakeEval + Send + Sync>;

#[derive(Default)]
pub struct FakeState {
    pub launches: usize,
    pub shutdowns: usize,
    pub loads: Vec<String>,
    pub prelude_installed: bool,
    pub evaluated: Vec<String>,
    pub failing_capability: Option<String>,
    captured: String,
}

#[derive(Clone)]
pub struct FakeLauncher {
    state: Arc<Mutex<FakeState>>,
    script: Script,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            script: Arc::new(|_| FakeEval::value(RawValue::Undefined)),
        }
    }
}

impl FakeLauncher {
    pub fn with_script(mut self, f: impl Fn(&str) -> FakeEval + Send + Sync + 'static) -> Self {
        self.script = Arc::new(f);
        self
    }

    pub fn failing_capability(self, name: &str) -> Self {
        self.state.lock().unwrap().failing_capability = Some(name.to_string());
        self
    }

    pub fn state(&self) -> Arc<Mutex<FakeState>> {
        self.state.clone()
    }
}

pub struct FakeInterpreter {
    state: Arc<Mutex<FakeState>>,
    script: Script,
}

#[async_trait]
impl Launcher for FakeLauncher {
    type Handle = FakeInterpreter;

    async fn launch(&self) -> Result<FakeInterpreter, InterpreterError> {
        self.state.lock().unwrap().launches += 1;
        Ok(FakeInterpreter { state: self.state.clone(), script: self.script.clone() })
    }
}

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn load_capability(&mut self, name: &str) -> Result<(), InterpreterError> {
        let mut st = self.state.lock().unwrap();
        if st.failing_capability.as_deref() == Some(name) {
            return Err(InterpreterError::Raised(format!("ModuleNotFoundError: No module named '{}'", name)));
        }
        st.loads.push(name.to_string());
        Ok(())
    }

    async fn run(&mut self, code: &str) -> Result<(), InterpreterError> {
        let mut st = self.state.lock().unwrap();
        if code == PRELUDE {
            st.prelude_installed = true;
        } else if code == RESET_CAPTURE {
            st.captured.clear();
        }
        Ok(())
    }

    async fn eval(&mut self, code: &str) -> Result<RawValue, InterpreterError> {
        if code == READ_CAPTURE {
            return Ok(RawValue::Str(self.state.lock().unwrap().captured.clone()));
        }
        let reaction = (self.script)(code);
        {
            let mut st = self.state.lock().unwrap();
            st.evaluated.push(code.to_string());
            st.captured.push_str(&reaction.printed);
        }
        if reaction.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        reaction.result
    }

    async fn shutdown(&mut self) {
        self.state.lock().unwrap().shutdowns += 1;
    }
}
