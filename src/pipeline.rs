//! Render pipeline – expands a package's markup with a validated payload,
//! checks its asset references, and hands the result to a converter.

use crate::assets;
use crate::config::PageConfig;
use crate::converter::{ConvertRequest, PdfConverter};
use crate::error::{Error, Result};
use crate::markup;
use crate::package::TemplateDescriptor;
use crate::payload::ValidatedPayload;

/// Expanded markup with its resolved assets, ready for conversion.
pub fn prepare(
    descriptor: &TemplateDescriptor,
    payload: &ValidatedPayload,
    page: &PageConfig,
) -> Result<ConvertRequest> {
    let failed = |reason: String| Error::RenderFailed {
        template: descriptor.name().to_string(),
        reason,
    };

    let expanded = descriptor
        .expand(payload)
        .map_err(|e| failed(format!("markup expansion: {e}")))?;
    let nodes = markup::parse(&expanded).map_err(|e| failed(format!("markup: {e}")))?;

    let references = assets::collect_references(&nodes, descriptor.stylesheet());
    let resolved = assets::resolve(descriptor, &references)?;
    log::debug!(
        "Template '{}' expanded to {} bytes, {} local asset(s)",
        descriptor.name(),
        expanded.len(),
        resolved.len()
    );

    Ok(ConvertRequest {
        title: descriptor.name().to_string(),
        markup: expanded,
        stylesheet: descriptor.stylesheet().to_string(),
        assets: resolved,
        page: page.clone(),
    })
}

/// Full pipeline: validated payload -> PDF bytes.
pub fn render(
    descriptor: &TemplateDescriptor,
    payload: &ValidatedPayload,
    converter: &dyn PdfConverter,
    page: &PageConfig,
) -> Result<Vec<u8>> {
    let request = prepare(descriptor, payload, page)?;
    converter.convert(&request).map_err(|e| Error::RenderFailed {
        template: descriptor.name().to_string(),
        reason: e.to_string(),
    })
}
