use std::error::Error as StdError;
use std::fs;
use std::path::Path;

use tera::{Context, Tera};
use tracing::debug;

use crate::domain::aggregate::model::AggregatedView;
use crate::domain::report::dto::{ProviderCompleteness, ReportContextDto};
use crate::domain::report::service::templates;
use crate::errors::TemplateError;

/// Renders an aggregated view through a named template. Output depends only on
/// the view, the completeness list and the template source.
pub struct ReportRenderer {
    tera: Tera,
}

impl ReportRenderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec!["html", ".htm", ".xml"]);
        tera.add_raw_templates(templates::builtin())
            .map_err(|e| TemplateError::Setup(error_chain(&e)))?;
        Ok(Self { tera })
    }

    /// Built-ins plus every file in `dir`, registered by file name and by stem.
    pub fn with_template_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut renderer = Self::new()?;

        let entries = fs::read_dir(dir)
            .map_err(|e| TemplateError::Setup(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let source = fs::read_to_string(&path)
                .map_err(|e| TemplateError::Setup(format!("{}: {}", path.display(), e)))?;

            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or_default();

            for name in [file_name, stem] {
                if name.is_empty() {
                    continue;
                }
                renderer
                    .tera
                    .add_raw_template(name, &source)
                    .map_err(|e| TemplateError::Setup(error_chain(&e)))?;
            }
            debug!(template = %file_name, "Loaded custom template");
        }

        Ok(renderer)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn render(
        &self,
        view: &AggregatedView,
        completeness: &[ProviderCompleteness],
        template_name: &str,
    ) -> Result<Vec<u8>, TemplateError> {
        let dto = ReportContextDto::build(view, completeness).map_err(|e| TemplateError::Render {
            name: template_name.to_string(),
            message: e.to_string(),
        })?;
        self.render_context(&dto, template_name)
    }

    pub fn render_context(&self, dto: &ReportContextDto, template_name: &str) -> Result<Vec<u8>, TemplateError> {
        if !self.has_template(template_name) {
            return Err(TemplateError::NotFound(template_name.to_string()));
        }

        let context = Context::from_serialize(dto).map_err(|e| TemplateError::Render {
            name: template_name.to_string(),
            message: error_chain(&e),
        })?;

        let out = self
            .tera
            .render(template_name, &context)
            .map_err(|e| TemplateError::Render {
                name: template_name.to_string(),
                message: error_chain(&e),
            })?;

        debug!(template = %template_name, bytes = out.len(), "Report rendered");
        Ok(out.into_bytes())
    }
}

/// Tera nests the useful message under its sources.
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
