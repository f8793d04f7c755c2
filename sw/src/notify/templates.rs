//! Mail templates
//!
//! Bodies are rendered with handlebars. Each template can be overridden by a
//! `<name>.hbs` file in the configured template directory; otherwise the
//! copy compiled into the binary is used.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::aggregate::NotificationPayload;
use super::error::NotifyError;

/// Change notification, HTML part
pub const CHANGES_HTML: &str = include_str!("../../templates/changes.html.hbs");

/// Change notification, plain text part
pub const CHANGES_TEXT: &str = include_str!("../../templates/changes.txt.hbs");

/// Cycle status report, HTML part
pub const STATUS_HTML: &str = include_str!("../../templates/status.html.hbs");

/// Cycle status report, plain text part
pub const STATUS_TEXT: &str = include_str!("../../templates/status.txt.hbs");

/// Startup notice
pub const STARTUP_TEXT: &str = include_str!("../../templates/startup.txt.hbs");

/// Get the embedded template by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "changes.html" => Some(CHANGES_HTML),
        "changes.txt" => Some(CHANGES_TEXT),
        "status.html" => Some(STATUS_HTML),
        "status.txt" => Some(STATUS_TEXT),
        "startup.txt" => Some(STARTUP_TEXT),
        _ => {
            debug!(%name, "get_embedded: no match found");
            None
        }
    }
}

/// Rendered mail body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailBody {
    pub text: String,
    pub html: Option<String>,
}

/// Loads and renders mail templates
pub struct TemplateRenderer {
    hbs: Handlebars<'static>,
    override_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    pub fn new(override_dir: Option<&Path>) -> Self {
        debug!(?override_dir, "TemplateRenderer::new: called");
        Self {
            hbs: Handlebars::new(),
            override_dir: override_dir.filter(|d| d.is_dir()).map(Path::to_path_buf),
        }
    }

    /// Renderer that ignores any override directory
    pub fn embedded_only() -> Self {
        Self::new(None)
    }

    fn load_template(&self, name: &str) -> Result<String, NotifyError> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.hbs", name));
            if path.is_file() {
                debug!(?path, "TemplateRenderer::load_template: using override");
                return std::fs::read_to_string(&path).map_err(|source| NotifyError::TemplateRead { path, source });
            }
        }

        get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| NotifyError::TemplateNotFound(name.to_string()))
    }

    /// Render one template against any serializable context
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String, NotifyError> {
        debug!(%name, "TemplateRenderer::render: called");
        let template = self.load_template(name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| NotifyError::Render {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Plain text and HTML bodies for a change notification
    pub fn changes(&self, payload: &NotificationPayload, generated_at: &str) -> Result<MailBody, NotifyError> {
        let context = ChangesContext::new(payload, generated_at);
        Ok(MailBody {
            text: self.render("changes.txt", &context)?,
            html: Some(self.render("changes.html", &context)?),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChangesContext {
    subject: String,
    generated_at: String,
    total_changes: usize,
    sections: Vec<SectionView>,
}

#[derive(Debug, Serialize)]
struct SectionView {
    id: String,
    name: String,
    url: Option<String>,
    records: Vec<RecordView>,
}

#[derive(Debug, Serialize)]
struct RecordView {
    revision: u64,
    author: String,
    timestamp: String,
    message: String,
    kind: &'static str,
    color: &'static str,
    paths: Vec<PathView>,
}

#[derive(Debug, Serialize)]
struct PathView {
    action: &'static str,
    path: String,
}

impl ChangesContext {
    fn new(payload: &NotificationPayload, generated_at: &str) -> Self {
        let sections = payload
            .sections
            .iter()
            .map(|section| SectionView {
                id: section.id.clone(),
                name: section.name.clone(),
                url: section.url.clone(),
                records: section
                    .records
                    .iter()
                    .map(|record| {
                        let kind = record.change_kind();
                        RecordView {
                            revision: record.revision,
                            author: record.author.clone(),
                            timestamp: record.timestamp.clone(),
                            message: record.message.clone(),
                            kind: kind.label(),
                            color: kind.color(),
                            paths: record
                                .paths
                                .iter()
                                .map(|p| PathView {
                                    action: p.action.label(),
                                    path: p.path.clone(),
                                })
                                .collect(),
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            subject: payload.subject.clone(),
            generated_at: generated_at.to_string(),
            total_changes: payload.total_changes,
            sections,
        }
    }
}
