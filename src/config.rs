//! Service configuration – where packages live, what their files are called,
//! and the page geometry handed to the converter.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields a
//! working A4 portrait setup reading packages from `./templates`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default page margins in points.
pub const PAGE_MARGIN_PT: f32 = 40.0;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Root directory scanned for template packages.
    pub templates_dir: PathBuf,
    /// File names every package uses.
    pub package: PackageLayout,
    /// Stylesheet used by packages that ship no stylesheet of their own.
    pub default_stylesheet: Option<PathBuf>,
    /// Page geometry for generated documents.
    pub page: PageConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            package: PackageLayout::default(),
            default_stylesheet: None,
            page: PageConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Config with defaults and the given templates root.
    pub fn with_templates_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Load a TOML config file. Relative paths inside it are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_toml(&text).map_err(|reason| Error::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        if let Some(base) = path.parent() {
            config.templates_dir = resolve(base, &config.templates_dir);
            config.default_stylesheet = config
                .default_stylesheet
                .as_deref()
                .map(|p| resolve(base, p));
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Names of the files that make up a package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageLayout {
    pub shape_file: String,
    pub markup_file: String,
    pub style_file: String,
}

impl Default for PackageLayout {
    fn default() -> Self {
        Self {
            shape_file: "shape.json".to_string(),
            markup_file: "template.html".to_string(),
            style_file: "styles.css".to_string(),
        }
    }
}

/// Page orientation for generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Page geometry in PDF points.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageConfig {
    /// Page width in points (default: A4 = 595.28).
    pub width: f32,
    /// Page height in points (default: A4 = 841.89).
    pub height: f32,
    /// Page margin in points (default: 40).
    pub margin: f32,
    /// Swaps effective width/height when `Landscape`.
    pub orientation: PageOrientation,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin: PAGE_MARGIN_PT,
            orientation: PageOrientation::Portrait,
        }
    }
}

impl PageConfig {
    /// Effective page width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.width,
            PageOrientation::Landscape => self.height,
        }
    }

    /// Effective page height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.height,
            PageOrientation::Landscape => self.width,
        }
    }

    /// Width available to content between the margins.
    pub fn content_width(&self) -> f32 {
        (self.effective_width() - 2.0 * self.margin).max(1.0)
    }

    /// Height available to content between the margins.
    pub fn content_height(&self) -> f32 {
        (self.effective_height() - 2.0 * self.margin).max(1.0)
    }

    /// Create an A4 landscape config.
    pub fn a4_landscape() -> Self {
        Self {
            orientation: PageOrientation::Landscape,
            ..Self::default()
        }
    }
}
