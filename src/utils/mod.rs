//! Utilities (fence stripping, opening files with the platform viewer).

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Strip a surrounding Markdown code fence (```lang ... ```) from model output.
pub fn strip_fences(text: &str) -> String {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // drop the language tag on the opening line
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '+');
        s = rest.trim_start_matches([' ', '\t']);
        s = s.strip_prefix("\r\n").or_else(|| s.strip_prefix('\n')).unwrap_or(s);
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end_matches(['\n', '\r']);
    }
    s.trim().to_string()
}

fn viewer_command(path: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd.exe");
        c.args(["/c", "start", ""]);
        c
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    cmd.arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

/// Hand a file to the platform's default viewer. The viewer is spawned and
/// left running; nothing waits for it.
pub fn open_in_viewer(path: &Path) -> Result<()> {
    viewer_command(path)
        .spawn()
        .with_context(|| format!("failed to launch viewer for {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_fence() {
        let raw = "```python\nprint('hi')\n```";
        assert_eq!(strip_fences(raw), "print('hi')");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_fences("```\n<div>x</div>\n```\n"), "<div>x</div>");
    }

    #[test]
    fn leaves_unfenced_code_alone() {
        assert_eq!(strip_fences("  x = 1\nx  "), "x = 1\nx");
    }

    #[test]
    fn keeps_inner_backticks() {
        let raw = "```py\ns = '``'\n```";
        assert_eq!(strip_fences(raw), "s = '``'");
    }

    #[test]
    fn viewer_receives_the_path() {
        let cmd = viewer_command(Path::new("/tmp/plot.png"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args.last().map(|a| a.to_string_lossy().into_owned()).as_deref(), Some("/tmp/plot.png"));
        let program = cmd.get_program().to_string_lossy().into_owned();
        assert!(["xdg-open", "open", "cmd.exe"].contains(&program.as_str()));
    }
}
