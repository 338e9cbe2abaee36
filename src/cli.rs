use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "codecanvas", about = "Generate Python from a request, run it and render the result", version)]
#[command(group(ArgGroup::new("input").args(["prompt", "source"]).multiple(false)))]
#[command(group(ArgGroup::new("mode").args(["repl", "json"]).multiple(false)))]
pub struct Cli {
    /// Natural-language request to turn into code.
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Run this source file directly instead of generating code.
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Large language model to use.
    #[arg(long)]
    pub model: Option<String>,

    /// Randomness of generated code (defaults to TEMPERATURE from config).
    #[arg(long, value_parser = clap::value_parser!(f32))]
    pub temperature: Option<f32>,

    /// Write the rendered host page (HTML) to this file.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Save a rendered plot into this directory.
    #[arg(long = "save-plot", value_name = "DIR")]
    pub save_plot: Option<PathBuf>,

    /// Print a short-lived reference to a rendered plot.
    #[arg(long = "copy-ref")]
    pub copy_ref: bool,

    /// Open a rendered plot in the platform viewer.
    #[arg(long)]
    pub open: bool,

    /// Print the tagged result as JSON instead of the terminal view.
    #[arg(long)]
    pub json: bool,

    /// Read requests line by line, reusing one interpreter session.
    #[arg(long)]
    pub repl: bool,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn wants_export(&self) -> bool {
        self.save_plot.is_some() || self.copy_ref || self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_and_source_are_exclusive() {
        assert!(Cli::try_parse_from(["codecanvas", "plot", "--source", "a.py"]).is_err());
        let cli = Cli::try_parse_from(["codecanvas", "--source", "a.py", "--json"]).unwrap();
        assert_eq!(cli.source, Some(PathBuf::from("a.py")));
        assert!(cli.json);
        assert!(!cli.wants_export());
    }

    #[test]
    fn export_flags() {
        let cli = Cli::try_parse_from(["codecanvas", "sine wave", "--save-plot", "out", "--open"]).unwrap();
        assert_eq!(cli.prompt.as_deref(), Some("sine wave"));
        assert!(cli.wants_export());
        assert_eq!(cli.temperature, None);
    }
}
