//! Document service – the operations a transport layer exposes: list the
//! templates, describe what a template needs, generate a document.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{PageConfig, ServiceConfig};
use crate::converter::{FlowConverter, PdfConverter};
use crate::error::Result;
use crate::pipeline;
use crate::registry::{RegistrySnapshot, ReloadReport, TemplateRegistry};
use crate::shape::PayloadShape;
use crate::validate::validate;

/// What a caller needs to know to fill a template: its required top-level
/// fields and an example payload that passes validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSchema {
    pub template: String,
    pub required: Vec<String>,
    pub payload: serde_json::Value,
}

pub struct DocumentService {
    registry: TemplateRegistry,
    converter: Box<dyn PdfConverter>,
    page: PageConfig,
}

impl std::fmt::Debug for DocumentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentService")
            .field("registry", &self.registry)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

impl DocumentService {
    /// Open the registry described by `config` with the built-in converter.
    pub fn open(config: &ServiceConfig) -> Result<Self> {
        Self::with_converter(config, Box::new(FlowConverter::new()))
    }

    pub fn with_converter(config: &ServiceConfig, converter: Box<dyn PdfConverter>) -> Result<Self> {
        Ok(Self {
            registry: TemplateRegistry::open(config)?,
            converter,
            page: config.page.clone(),
        })
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn page(&self) -> &PageConfig {
        &self.page
    }

    /// Page geometry used for subsequent documents.
    pub fn set_page(&mut self, page: PageConfig) {
        self.page = page;
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.registry.list_templates()
    }

    pub fn describe(&self, name: &str) -> Result<Arc<PayloadShape>> {
        Ok(Arc::clone(self.registry.lookup(name)?.shape()))
    }

    pub fn schema(&self, name: &str) -> Result<TemplateSchema> {
        let shape = self.describe(name)?;
        Ok(TemplateSchema {
            template: name.to_string(),
            required: shape.required_fields(),
            payload: shape.example_payload(),
        })
    }

    /// Lookup, validate, render. The template is taken from one snapshot so
    /// a concurrent reload cannot mix package versions within a request.
    pub fn generate(&self, name: &str, raw: &serde_json::Value) -> Result<Vec<u8>> {
        let descriptor = self.registry.lookup(name)?;
        let payload = validate(descriptor.shape(), raw)?;
        let bytes = pipeline::render(&descriptor, &payload, self.converter.as_ref(), &self.page)?;
        log::info!("Generated '{name}' ({} bytes)", bytes.len());
        Ok(bytes)
    }

    pub fn reload(&self) -> Result<ReloadReport> {
        self.registry.reload()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }
}
