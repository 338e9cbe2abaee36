//! HTML serialization of presentations and of the host page.

use std::path::Path;

use super::{Container, Presentation, Tone};
use crate::console::{ConsoleLog, LogLevel};

/// Capabilities granted to generated markup inside its frame. Inheriting the
/// host origin and top-level navigation cannot be expressed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub allow_scripts: bool,
    pub allow_forms: bool,
    pub allow_popups: bool,
    pub allow_modals: bool,
}

impl SandboxPolicy {
    pub const GENERATED_CONTENT: SandboxPolicy = SandboxPolicy {
        allow_scripts: true,
        allow_forms: true,
        allow_popups: true,
        allow_modals: true,
    };

    pub fn attribute(&self) -> String {
        [
            (self.allow_scripts, "allow-scripts"),
            (self.allow_forms, "allow-forms"),
            (self.allow_popups, "allow-popups"),
            (self.allow_modals, "allow-modals"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
    }
}

const SCAFFOLD_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<style>
body { margin: 0; padding: 20px; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f8f9fa; }
.generated-table { width: 100%; border-collapse: collapse; margin: 10px 0; background: white; }
.generated-table th, .generated-table td { border: 1px solid #ddd; padding: 8px; text-align: left; }
.generated-table th { background: #f2f2f2; font-weight: bold; }
.generated-table tr:nth-child(even) { background: #f9f9f9; }
.generated-table tr:hover { background: #e9ecef; }
button, input, select { font-family: inherit; }
* { box-sizing: border-box; }
</style>
</head>
<body>
"#;

const SCAFFOLD_TAIL: &str = "\n</body>\n</html>\n";

/// Wrap a markup fragment in a minimal document.
pub fn scaffold(fragment: &str) -> String {
    let mut doc = String::with_capacity(SCAFFOLD_HEAD.len() + fragment.len() + SCAFFOLD_TAIL.len());
    doc.push_str(SCAFFOLD_HEAD);
    doc.push_str(fragment);
    doc.push_str(SCAFFOLD_TAIL);
    doc
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn presentation_html(p: &Presentation, page_dir: Option<&Path>) -> String {
    match p {
        Presentation::Plot { image, media_type, actions } => {
            let url = escape(&image.url(page_dir));
            let ext = super::artifact::extension_for(media_type);
            let mut html = format!(
                "<div class=\"plot-wrapper\">\n<img class=\"rendered-plot\" src=\"{url}\" alt=\"Generated plot\" style=\"max-width:100%;height:auto\">\n<div class=\"plot-controls\">\n"
            );
            for action in actions {
                html.push_str(&format!(
                    "<a class=\"download-btn\" data-action=\"{}\" href=\"{url}\"{}>{}</a>\n",
                    action.id(),
                    match action {
                        super::ExportAction::SaveToFile => format!(" download=\"codecanvas-plot.{}\"", ext),
                        super::ExportAction::OpenExternal => " target=\"_blank\" rel=\"noopener\"".to_string(),
                        super::ExportAction::CopyReference => String::new(),
                    },
                    escape(action.label()),
                ));
            }
            html.push_str("</div>\n</div>");
            html
        }
        Presentation::Frame(frame) => format!(
            "<iframe class=\"sandboxed-iframe\" sandbox=\"{}\" srcdoc=\"{}\"></iframe>",
            frame.policy.attribute(),
            escape(&frame.srcdoc)
        ),
        Presentation::Preformatted { class, text } => {
            format!("<pre class=\"{}\">{}</pre>", class, escape(text))
        }
        Presentation::Placeholder { icon, message, tone } => {
            let class = match tone {
                Tone::Neutral => "placeholder",
                Tone::Error => "placeholder error",
            };
            format!(
                "<div class=\"{}\">\n<div class=\"placeholder-icon\">{}</div>\n<p>{}</p>\n</div>",
                class,
                escape(icon),
                escape(message)
            )
        }
    }
}

/// Full host page: status, elapsed time, the source that ran, the mounted
/// presentation and the console.
pub fn host_page(
    container: &Container,
    status: &str,
    elapsed_ms: Option<f64>,
    source: Option<&str>,
    console: &ConsoleLog,
    page_dir: Option<&Path>,
) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>CodeCanvas</title>\n<style>\n\
         body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 24px; }\n\
         .sandboxed-iframe { width: 100%; min-height: 480px; border: 1px solid #ddd; border-radius: 8px; }\n\
         .rendered-plot { border: 1px solid #ddd; border-radius: 8px; }\n\
         .download-btn { margin-right: 10px; }\n\
         .placeholder.error { color: #b00020; }\n\
         pre { background: #f6f8fa; padding: 12px; overflow-x: auto; }\n\
         .generated-code pre { font-size: 13px; }\n\
         </style>\n</head>\n<body>\n",
    );
    page.push_str(&format!("<div class=\"status\">{}</div>\n", escape(status)));
    if let Some(ms) = elapsed_ms {
        page.push_str(&format!("<div class=\"execution-time\">{:.1} ms</div>\n", ms));
    }
    if let Some(code) = source {
        page.push_str("<details class=\"generated-code\" open>\n<summary>Generated code</summary>\n<pre><code>");
        page.push_str(&escape(code));
        page.push_str("</code></pre>\n</details>\n");
    }
    page.push_str("<div id=\"output\">\n");
    page.push_str(&container.to_html(page_dir));
    page.push_str("\n</div>\n<pre id=\"console-output\">");
    for entry in console.entries() {
        let level = match entry.level {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        };
        page.push_str(&format!(
            "<span class=\"{}\">[{}] {}</span>\n",
            level,
            entry.timestamp.format("%H:%M:%S"),
            escape(&entry.message)
        ));
    }
    page.push_str("</pre>\n</body>\n</html>\n");
    page
}
