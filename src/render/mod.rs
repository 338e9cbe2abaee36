//! Sandbox renderer: turns a tagged result into one isolated presentation
//! subtree and owns the binary artifacts behind rendered plots.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info};

use crate::classify::ExecutionResult;
use crate::console::ConsoleLog;
use crate::errors::{PipelineError, PipelineResult};

pub mod artifact;
pub mod html;

pub use artifact::{ArtifactRef, ArtifactStore, BinaryArtifact};
pub use html::SandboxPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAction {
    SaveToFile,
    CopyReference,
    OpenExternal,
}

impl ExportAction {
    pub const ALL: [ExportAction; 3] =
        [ExportAction::SaveToFile, ExportAction::CopyReference, ExportAction::OpenExternal];

    pub fn id(&self) -> &'static str {
        match self {
            ExportAction::SaveToFile => "save",
            ExportAction::CopyReference => "copy",
            ExportAction::OpenExternal => "open",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportAction::SaveToFile => "💾 Download",
            ExportAction::CopyReference => "📋 Copy",
            ExportAction::OpenExternal => "🔍 Open in new window",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedFrame {
    pub srcdoc: String,
    pub policy: SandboxPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Plot { image: ArtifactRef, media_type: String, actions: Vec<ExportAction> },
    Frame(IsolatedFrame),
    Preformatted { class: &'static str, text: String },
    Placeholder { icon: String, message: String, tone: Tone },
}

impl Presentation {
    pub fn placeholder(icon: &str, message: impl Into<String>) -> Self {
        Presentation::Placeholder { icon: icon.to_string(), message: message.into(), tone: Tone::Neutral }
    }

    pub fn error(message: &str) -> Self {
        Presentation::Placeholder {
            icon: "❌".to_string(),
            message: format!("Error: {}", message),
            tone: Tone::Error,
        }
    }
}

/// Mountable surface holding at most one presentation subtree.
#[derive(Debug, Default)]
pub struct Container {
    content: Option<Presentation>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.content = None;
    }

    pub fn mount(&mut self, p: Presentation) {
        self.content = Some(p);
    }

    pub fn content(&self) -> Option<&Presentation> {
        self.content.as_ref()
    }

    pub fn to_html(&self, page_dir: Option<&Path>) -> String {
        self.content
            .as_ref()
            .map(|p| html::presentation_html(p, page_dir))
            .unwrap_or_default()
    }

    /// Host page around the mounted presentation. Artifact links are made
    /// relative to `page_dir` when the store lives below it.
    pub fn to_html_page(
        &self,
        status: &str,
        elapsed: Option<Duration>,
        source: Option<&str>,
        console: &ConsoleLog,
        page_dir: Option<&Path>,
    ) -> String {
        html::host_page(self, status, elapsed.map(|d| d.as_secs_f64() * 1000.0), source, console, page_dir)
    }
}

struct RenderedPlot {
    reference: ArtifactRef,
    media_type: String,
    data: String,
}

pub struct SandboxRenderer {
    store: ArtifactStore,
    current: Option<RenderedPlot>,
    export_grace: Duration,
}

impl SandboxRenderer {
    pub fn new(store: ArtifactStore, export_grace: Duration) -> Self {
        Self { store, current: None, export_grace }
    }

    #[cfg(test)]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Reference backing the plot currently on screen.
    pub fn current_plot(&self) -> Option<&ArtifactRef> {
        self.current.as_ref().map(|p| &p.reference)
    }

    /// Replace the container content with the presentation of `result`.
    /// A failure while rendering mounts an error placeholder and is returned
    /// so the caller can record it.
    pub fn render(&mut self, container: &mut Container, result: ExecutionResult) -> PipelineResult<()> {
        self.reset(container);
        let kind = result.kind();
        match self.present(result) {
            Ok(p) => {
                debug!(kind = %kind, "mounted presentation");
                container.mount(p);
                Ok(())
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "render failed");
                container.mount(Presentation::error(&e.to_string()));
                Err(e)
            }
        }
    }

    pub fn render_error(&mut self, container: &mut Container, message: &str) {
        self.reset(container);
        container.mount(Presentation::error(message));
    }

    fn reset(&mut self, container: &mut Container) {
        container.clear();
        self.release_current();
        self.store.sweep();
    }

    fn present(&mut self, result: ExecutionResult) -> PipelineResult<Presentation> {
        match result {
            ExecutionResult::Plot { media_type, data } => self.present_plot(media_type, data),
            ExecutionResult::Markup { content, full_document } => {
                let srcdoc = if full_document { content } else { html::scaffold(&content) };
                Ok(Presentation::Frame(IsolatedFrame { srcdoc, policy: SandboxPolicy::GENERATED_CONTENT }))
            }
            ExecutionResult::Structured { content } => {
                Ok(Presentation::Preformatted { class: "rendered-json", text: content })
            }
            ExecutionResult::Text { content } => {
                Ok(Presentation::Preformatted { class: "rendered-text", text: content })
            }
            ExecutionResult::Empty { message } => Ok(Presentation::placeholder("✅", message)),
            ExecutionResult::Error { message } => Ok(Presentation::error(&message)),
        }
    }

    fn present_plot(&mut self, media_type: String, data: String) -> PipelineResult<Presentation> {
        let artifact = BinaryArtifact::decode(&media_type, &data)?;
        let reference = self.store.register(&artifact, None).map_err(store_error)?;
        self.current = Some(RenderedPlot { reference: reference.clone(), media_type: media_type.clone(), data });
        Ok(Presentation::Plot { image: reference, media_type, actions: ExportAction::ALL.to_vec() })
    }

    fn release_current(&mut self) {
        if let Some(prev) = self.current.take() {
            self.store.revoke(&prev.reference);
        }
    }

    fn fresh_artifact(&self) -> PipelineResult<BinaryArtifact> {
        let plot = self
            .current
            .as_ref()
            .ok_or_else(|| PipelineError::Render("no plot is currently rendered".to_string()))?;
        BinaryArtifact::decode(&plot.media_type, &plot.data)
    }

    /// Save the current plot as `codecanvas-plot-<millis>.<ext>` inside `dir`.
    pub fn save_to_file(&self, dir: &Path) -> PipelineResult<PathBuf> {
        let artifact = self.fresh_artifact()?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        std::fs::create_dir_all(dir).map_err(store_error)?;
        let path = dir.join(format!("codecanvas-plot-{}.{}", millis, artifact.extension()));
        std::fs::write(&path, &artifact.bytes).map_err(store_error)?;
        info!(path = %path.display(), "plot saved");
        Ok(path)
    }

    /// A new reference to the current plot, released after the grace period.
    pub fn copy_reference(&mut self) -> PipelineResult<ArtifactRef> {
        let artifact = self.fresh_artifact()?;
        self.store.register(&artifact, Some(self.export_grace)).map_err(store_error)
    }

    /// Hand a fresh reference to the platform viewer.
    pub fn open_external(&mut self) -> PipelineResult<ArtifactRef> {
        let reference = self.copy_reference()?;
        crate::utils::open_in_viewer(reference.path())
            .map_err(|e| PipelineError::Render(format!("{:#}", e)))?;
        Ok(reference)
    }

    /// Wait out pending export grace periods and release those references.
    pub async fn settle(&mut self) {
        if let Some(deadline) = self.store.last_expiry() {
            let now = Instant::now();
            if deadline > now {
                tokio::time::sleep(deadline - now).await;
            }
        }
        self.store.sweep();
    }
}

fn store_error(e: std::io::Error) -> PipelineError {
    PipelineError::Render(format!("artifact store: {}", e))
}
