//! # escriba – template registry and PDF document generation
//!
//! A template is a package folder holding a payload shape (`shape.json`),
//! markup (`template.html`), a stylesheet (`styles.css`) and any assets it
//! references. Generating a document runs these stages:
//!
//! 1. **Lookup** – find the package in the current registry snapshot ([`registry`])
//! 2. **Validate** – check and normalize the payload against its shape ([`validate`])
//! 3. **Expand** – render the markup with the payload as data ([`package`])
//! 4. **Resolve** – check every local asset reference ([`assets`])
//! 5. **Convert** – lay out and emit PDF bytes ([`converter`], [`layout`], [`fonts`], [`render`])
//!
//! [`DocumentService`] ties the stages together behind the operations a
//! transport layer exposes.

pub mod assets;
pub mod config;
pub mod converter;
pub mod css;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod markup;
pub mod package;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod service;
pub mod shape;
pub mod validate;

// Re-exports for convenience
pub use config::{PageConfig, PageOrientation, ServiceConfig};
pub use converter::{ConvertError, ConvertRequest, FlowConverter, PdfConverter};
pub use error::{Error, ErrorKind, FieldError, Result, ValidationErrors};
pub use package::TemplateDescriptor;
pub use payload::{ValidatedPayload, Value};
pub use registry::{RegistrySnapshot, ReloadReport, TemplateRegistry};
pub use service::{DocumentService, TemplateSchema};
pub use shape::PayloadShape;
pub use validate::validate;
