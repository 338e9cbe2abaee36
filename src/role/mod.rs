//! System prompt used when asking the model for executable code.

use std::fs;

use tracing::warn;

use crate::config::Config;

const CODE_ROLE: &str = "You generate code that runs immediately inside a hosted Python interpreter, or HTML that is rendered in a sandboxed frame.
Rules:
1. Reply with code ONLY. No explanations, no comments around it, no Markdown, no ``` fences.
2. For Python:
  - Always import what you use at the top: import matplotlib.pyplot as plt, import numpy as np, import pandas as pd.
  - Build plots with matplotlib and finish with a bare call to render_plot() as the last expression. Never call plt.show().
  - For tables, end with table_to_markup(df) for a pandas DataFrame; it returns HTML.
  - numpy, pandas, scipy and sympy are available for computation.
  - Symbolic helpers: solve_equation('x**2 - 4 = 0'), integrate('x**2', 'x', 0, 1), differentiate('x**2', 'x').
  - print() output is shown to the user when nothing more specific is returned.
3. For HTML: return a complete document starting with <!DOCTYPE html>, or an HTML fragment.
4. Never use os, sys, subprocess, open(), files, the network, or plt.show().
5. The code must be ready to run as-is, with every import at the top.
6. If the request is unclear, make a reasonable assumption and return working code.";

/// Role text for code generation. `ROLE_PATH` may point at a file replacing it.
pub fn code_role_text(cfg: &Config) -> String {
    if let Some(path) = cfg.get_path("ROLE_PATH") {
        match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => warn!(path = %path.display(), "role file is empty, using built-in role"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot read role file, using built-in role"),
        }
    }
    CODE_ROLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_role_names_the_installed_helpers() {
        let cfg = Config::with_overrides(&[]);
        let text = code_role_text(&cfg);
        assert!(text.contains("render_plot()"));
        assert!(text.contains("table_to_markup(df)"));
    }

    #[test]
    fn role_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("role.txt");
        fs::write(&path, "custom role").unwrap();
        let cfg = Config::with_overrides(&[("ROLE_PATH", path.to_str().unwrap())]);
        assert_eq!(code_role_text(&cfg), "custom role");
    }

    #[test]
    fn missing_role_file_falls_back() {
        let cfg = Config::with_overrides(&[("ROLE_PATH", "/definitely/not/here.txt")]);
        assert!(code_role_text(&cfg).starts_with("You generate code"));
    }
}
