//! Python interpreter process bootstrap and I/O glue.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use super::ProcessHandle;

pub async fn start_python(program: &str, bootstrap: &str) -> Result<ProcessHandle> {
    let mut cmd = Command::new(program);
    cmd.arg("-u") // unbuffered
        .arg("-c")
        .arg(bootstrap)
        .env("MPLBACKEND", "Agg")
        .kill_on_drop(true)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child: Child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn python interpreter '{}'", program))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow::anyhow!("no stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("no stdout"))?;

    // Drain stderr so warnings never block the interpreter.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "codecanvas::python", "{}", line);
            }
        });
    }

    Ok(ProcessHandle {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    })
}
