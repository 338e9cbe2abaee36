//! Python execution protocol wrapper: NDJSON frames over the child's pipes.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{InterpreterError, Interpreter, Launcher, RawValue, Request, Response};
use crate::process::{python::start_python, ProcessHandle};

const BOOTSTRAP: &str = include_str!("bootstrap.py");

pub struct PythonLauncher {
    program: String,
}

impl PythonLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl Launcher for PythonLauncher {
    type Handle = PythonInterpreter;

    async fn launch(&self) -> Result<PythonInterpreter, InterpreterError> {
        let handle = start_python(&self.program, BOOTSTRAP)
            .await
            .map_err(|e| InterpreterError::Transport(format!("{:#}", e)))?;
        let mut interp = PythonInterpreter { handle, next_id: 1 };
        // the bootstrap announces itself with frame 0 carrying the version
        let hello = interp.read_frame(0).await?;
        let version = hello.into_value()?;
        info!(program = %self.program, version = version.display_text().unwrap_or("?"), "python interpreter started");
        Ok(interp)
    }
}

pub struct PythonInterpreter {
    handle: ProcessHandle,
    next_id: u64,
}

impl PythonInterpreter {
    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn call(&mut self, req: Request<'_>) -> Result<RawValue, InterpreterError> {
        let id = req.id();
        let line = serde_json::to_string(&req)
            .map_err(|e| InterpreterError::Transport(e.to_string()))?;
        self.handle
            .send_line(&line)
            .await
            .map_err(|e| InterpreterError::Transport(format!("cannot write to interpreter: {:#}", e)))?;
        self.read_frame(id).await?.into_value()
    }

    async fn read_frame(&mut self, id: u64) -> Result<Response, InterpreterError> {
        loop {
            let line = self
                .handle
                .recv_line()
                .await
                .map_err(|e| InterpreterError::Transport(format!("cannot read from interpreter: {:#}", e)))?
                .ok_or_else(|| InterpreterError::Transport("interpreter process exited".to_string()))?;
            let resp: Response = serde_json::from_str(&line)
                .map_err(|e| InterpreterError::Transport(format!("bad frame from interpreter: {}", e)))?;
            match resp.id {
                Some(got) if got == id => return Ok(resp),
                other => debug!(expected = id, got = ?other, "skipping stale interpreter frame"),
            }
        }
    }
}

#[async_trait]
impl Interpreter for PythonInterpreter {
    async fn load_capability(&mut self, name: &str) -> Result<(), InterpreterError> {
        let id = self.alloc_id();
        self.call(Request::Load { id, name }).await.map(|_| ())
    }

    async fn run(&mut self, code: &str) -> Result<(), InterpreterError> {
        let id = self.alloc_id();
        self.call(Request::Run { id, code }).await.map(|_| ())
    }

    async fn eval(&mut self, code: &str) -> Result<RawValue, InterpreterError> {
        let id = self.alloc_id();
        self.call(Request::Eval { id, code }).await
    }

    async fn shutdown(&mut self) {
        self.handle.kill().await;
    }
}
