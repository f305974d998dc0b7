//! Template registry – scans the templates root and publishes immutable
//! snapshots of the packages found there.
//!
//! Readers clone an `Arc` to the current [`RegistrySnapshot`] and keep using
//! it for as long as they like. [`TemplateRegistry::reload`] builds the next
//! snapshot off to the side and swaps the pointer in one step, so a reader
//! never sees a half-built catalog.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::{PackageLayout, ServiceConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::package::{PackageFiles, TemplateDescriptor};

/// A package folder that failed to load during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPackage {
    pub name: String,
    pub kind: ErrorKind,
    pub reason: String,
    #[serde(skip)]
    fingerprint: Option<String>,
}

/// Point-in-time catalog of loaded packages.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    templates: BTreeMap<String, Arc<TemplateDescriptor>>,
    skipped: Vec<SkippedPackage>,
}

impl RegistrySnapshot {
    /// Increases by one with every published reload; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Template names in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TemplateDescriptor>> {
        self.templates.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TemplateDescriptor>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<TemplateDescriptor>> {
        self.templates.values()
    }

    pub fn skipped(&self) -> &[SkippedPackage] {
        &self.skipped
    }
}

/// What a reload did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    /// Packages parsed during this reload.
    pub loaded: Vec<String>,
    /// Packages whose previous descriptor was kept because nothing changed.
    pub reused: Vec<String>,
    /// Packages present before and gone now.
    pub removed: Vec<String>,
    pub skipped: Vec<SkippedPackage>,
}

impl ReloadReport {
    /// Number of templates in the published snapshot.
    pub fn template_count(&self) -> usize {
        self.loaded.len() + self.reused.len()
    }
}

/// The template catalog.
#[derive(Debug)]
pub struct TemplateRegistry {
    root: PathBuf,
    layout: PackageLayout,
    default_stylesheet: Option<PathBuf>,
    published: ArcSwap<RegistrySnapshot>,
    reload_lock: Mutex<()>,
}

impl TemplateRegistry {
    /// An empty registry; call [`reload`](Self::reload) to populate it.
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            root: config.templates_dir.clone(),
            layout: config.package.clone(),
            default_stylesheet: config.default_stylesheet.clone(),
            published: ArcSwap::from_pointee(RegistrySnapshot::default()),
            reload_lock: Mutex::new(()),
        }
    }

    /// A registry populated by an initial scan.
    pub fn open(config: &ServiceConfig) -> Result<Self> {
        let registry = Self::new(config);
        registry.reload()?;
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.published.load_full()
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.snapshot().names()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TemplateDescriptor>> {
        self.snapshot().lookup(name)
    }

    /// Rescan the root and publish a new snapshot. Package-level failures are
    /// logged and recorded in the snapshot; only an unreadable root fails the
    /// reload, leaving the previous snapshot in place.
    pub fn reload(&self) -> Result<ReloadReport> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.snapshot();
        let fallback = self.default_stylesheet.as_deref();

        let mut templates = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut report = ReloadReport::default();

        for (name, dir) in self.candidates()? {
            let files = match PackageFiles::scan(&dir, &self.layout, fallback) {
                Ok(files) => files,
                Err(e) => {
                    log::warn!("Skipping template '{name}': cannot read package: {e}");
                    skipped.push(SkippedPackage {
                        name,
                        kind: ErrorKind::IncompleteTemplatePackage,
                        reason: format!("cannot read package: {e}"),
                        fingerprint: None,
                    });
                    continue;
                }
            };

            if let Some(existing) = previous.get(&name) {
                if existing.loaded_at().fingerprint == files.fingerprint {
                    log::debug!("Template '{name}' unchanged, reusing descriptor");
                    templates.insert(name.clone(), Arc::clone(existing));
                    report.reused.push(name);
                    continue;
                }
            }

            let fingerprint = files.fingerprint.clone();
            match TemplateDescriptor::load(&name, &dir, files, &self.layout, fallback) {
                Ok(descriptor) => {
                    log::debug!(
                        "Loaded template '{name}' ({} asset(s))",
                        descriptor.asset_paths().len()
                    );
                    templates.insert(name.clone(), Arc::new(descriptor));
                    report.loaded.push(name);
                }
                Err(e) => {
                    log::warn!("Skipping template '{name}': {e}");
                    skipped.push(SkippedPackage {
                        name,
                        kind: e.kind(),
                        reason: e.to_string(),
                        fingerprint: Some(fingerprint),
                    });
                }
            }
        }

        report.removed = previous
            .templates
            .keys()
            .filter(|name| !templates.contains_key(*name))
            .cloned()
            .collect();

        let snapshot = RegistrySnapshot {
            generation: previous.generation + 1,
            templates,
            skipped: skipped.clone(),
        };
        report.generation = snapshot.generation;
        report.skipped = skipped;

        self.published.store(Arc::new(snapshot));

        log::info!(
            "Template registry generation {}: {} template(s), {} reused, {} skipped, {} removed",
            report.generation,
            report.template_count(),
            report.reused.len(),
            report.skipped.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Whether the directory differs from the published snapshot: a package
    /// appeared, disappeared, or changed contents.
    pub fn needs_reload(&self) -> Result<bool> {
        let snapshot = self.snapshot();
        let fallback = self.default_stylesheet.as_deref();
        let candidates = self.candidates()?;

        let known = snapshot.templates.len() + snapshot.skipped.len();
        if candidates.len() != known {
            return Ok(true);
        }
        for (name, dir) in candidates {
            let previous = match snapshot.templates.get(&name) {
                Some(descriptor) => Some(descriptor.loaded_at().fingerprint.clone()),
                None => match snapshot.skipped.iter().find(|s| s.name == name) {
                    Some(skipped) => skipped.fingerprint.clone(),
                    None => return Ok(true),
                },
            };
            let current = PackageFiles::scan(&dir, &self.layout, fallback)
                .ok()
                .map(|files| files.fingerprint);
            if previous != current {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Package folders directly under the root, sorted by name.
    fn candidates(&self) -> Result<Vec<(String, PathBuf)>> {
        let unavailable = |source| Error::RegistryUnavailable {
            root: self.root.clone(),
            source,
        };
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(unavailable)? {
            let entry = entry.map_err(unavailable)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                log::debug!("Ignoring non UTF-8 folder under {}", self.root.display());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            found.push((name, path));
        }
        found.sort();
        Ok(found)
    }
}
