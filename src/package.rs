//! Template packages on disk and the descriptors loaded from them.
//!
//! A package is a folder holding a shape file, a markup file, a stylesheet
//! and any number of auxiliary assets (images, fonts, partial templates,
//! extra styles), possibly in subfolders. The folder name is the template's
//! public name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tera::{Context, Tera};

use crate::config::PackageLayout;
use crate::error::{Error, Result};
use crate::payload::ValidatedPayload;
use crate::shape::PayloadShape;

/// When a descriptor was built and from which package contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStamp {
    pub at: SystemTime,
    /// Hex SHA-256 over every file's relative path and bytes.
    pub fingerprint: String,
}

/// The files of one package folder and their combined fingerprint.
#[derive(Debug, Clone)]
pub(crate) struct PackageFiles {
    /// `/`-separated relative path -> absolute path, sorted.
    pub files: BTreeMap<String, PathBuf>,
    pub fingerprint: String,
}

impl PackageFiles {
    /// List and hash a package folder. `fallback_style` is folded into the
    /// fingerprint when the package has no stylesheet of its own, so edits to
    /// the shared stylesheet also mark the package as changed.
    pub fn scan(dir: &Path, layout: &PackageLayout, fallback_style: Option<&Path>) -> io::Result<Self> {
        let mut files = BTreeMap::new();
        list_files(dir, "", &mut files)?;

        let mut hasher = Sha256::new();
        for (relative, path) in &files {
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(fs::read(path)?);
            hasher.update([0u8]);
        }
        if !files.contains_key(&layout.style_file) {
            if let Some(style) = fallback_style {
                if let Ok(bytes) = fs::read(style) {
                    hasher.update(b"\0fallback-style\0");
                    hasher.update(bytes);
                }
            }
        }

        Ok(Self {
            files,
            fingerprint: format!("{:x}", hasher.finalize()),
        })
    }
}

fn list_files(dir: &Path, prefix: &str, out: &mut BTreeMap<String, PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            log::debug!("Skipping non UTF-8 file name in {}", dir.display());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if path.is_dir() {
            list_files(&path, &relative, out)?;
        } else {
            out.insert(relative, path);
        }
    }
    Ok(())
}

/// A fully loaded template package.
#[derive(Debug)]
pub struct TemplateDescriptor {
    name: String,
    root: PathBuf,
    markup_path: PathBuf,
    style_path: PathBuf,
    /// Relative name of the stylesheet when it lives inside the package.
    style_relative: Option<String>,
    asset_paths: BTreeMap<String, PathBuf>,
    shape: Arc<PayloadShape>,
    markup: Tera,
    markup_name: String,
    stylesheet: String,
    loaded_at: LoadStamp,
}

impl TemplateDescriptor {
    /// Build a descriptor from a scanned package folder. Fails if any
    /// mandatory file is missing, the shape does not parse, or the markup does
    /// not compile.
    pub(crate) fn load(
        name: &str,
        root: &Path,
        files: PackageFiles,
        layout: &PackageLayout,
        fallback_style: Option<&Path>,
    ) -> Result<Self> {
        let PackageFiles {
            mut files,
            fingerprint,
        } = files;

        let incomplete = |missing: &str| Error::IncompleteTemplatePackage {
            name: name.to_string(),
            missing: missing.to_string(),
        };
        let shape_path = files
            .remove(&layout.shape_file)
            .ok_or_else(|| incomplete(&layout.shape_file))?;
        let markup_path = files
            .remove(&layout.markup_file)
            .ok_or_else(|| incomplete(&layout.markup_file))?;
        let (style_path, style_relative) = match files.remove(&layout.style_file) {
            Some(path) => (path, Some(layout.style_file.clone())),
            None => match fallback_style {
                Some(path) if path.is_file() => {
                    log::debug!("Template '{name}' uses the default stylesheet");
                    (path.to_path_buf(), None)
                }
                _ => return Err(incomplete(&layout.style_file)),
            },
        };

        let shape = PayloadShape::load(&shape_path)?;

        let read = |path: &Path| {
            fs::read_to_string(path).map_err(|e| Error::IncompleteTemplatePackage {
                name: name.to_string(),
                missing: format!("readable {} ({e})", path.display()),
            })
        };
        let markup_source = read(markup_path.as_path())?;
        let stylesheet = read(style_path.as_path())?;

        // Partials shipped as assets can be included by relative path.
        let mut partials = Vec::new();
        for (relative, path) in &files {
            if relative.ends_with(".html") || relative.ends_with(".htm") {
                partials.push((relative.clone(), read(path.as_path())?));
            }
        }
        let markup_name = layout.markup_file.clone();
        let mut markup = Tera::default();
        markup.autoescape_on(vec![""]);
        partials.push((markup_name.clone(), markup_source));
        markup
            .add_raw_templates(partials)
            .map_err(|e| Error::InvalidMarkup {
                name: name.to_string(),
                reason: error_chain(&e),
            })?;

        Ok(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            markup_path,
            style_path,
            style_relative,
            asset_paths: files,
            shape: Arc::new(shape),
            markup,
            markup_name,
            stylesheet,
            loaded_at: LoadStamp {
                at: SystemTime::now(),
                fingerprint,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn markup_path(&self) -> &Path {
        &self.markup_path
    }

    pub fn style_path(&self) -> &Path {
        &self.style_path
    }

    /// Package-relative name of the stylesheet, `None` when the configured
    /// default stylesheet stands in.
    pub fn style_relative(&self) -> Option<&str> {
        self.style_relative.as_deref()
    }

    /// Auxiliary files keyed by `/`-separated package-relative path.
    pub fn asset_paths(&self) -> &BTreeMap<String, PathBuf> {
        &self.asset_paths
    }

    pub fn shape(&self) -> &Arc<PayloadShape> {
        &self.shape
    }

    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    pub fn loaded_at(&self) -> &LoadStamp {
        &self.loaded_at
    }

    /// Expand the markup with `payload` as the data context. Absent fields
    /// are undefined in the template; `null` fields are defined but falsy.
    pub fn expand(&self, payload: &ValidatedPayload) -> std::result::Result<String, String> {
        let context = Context::from_serialize(payload).map_err(|e| error_chain(&e))?;
        self.markup
            .render(&self.markup_name, &context)
            .map_err(|e| error_chain(&e))
    }
}

/// Render an error and its sources on one line.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
