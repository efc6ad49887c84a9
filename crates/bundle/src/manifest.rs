//! Bundle manifest model.
//!
//! The manifest is a JSON document named `manifest.json` at the root of the
//! uploaded tar. Resources are a tagged variant on `kind`.

use serde::{Deserialize, Serialize};

pub const MANIFEST_PATH: &str = "manifest.json";
pub const MANIFEST_KIND: &str = "Bundle";
pub const API_VERSION: &str = "htmlservd/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub api_version: String,
    pub kind: String,
    pub mode: ApplyMode,
    pub website: String,
    /// Website defaults applied on auto-create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<WebsiteDefaults>,
    /// Website-level head metadata (arbitrary JSON object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<serde_json::Value>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Upsert only the listed resources.
    Partial,
    /// Upsert the listed resources, then delete unlisted rows per kind.
    Full,
}

impl ApplyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyMode::Partial => "partial",
            ApplyMode::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_template: Option<String>,
}

/// One declared resource, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Component(ComponentSpec),
    Page(PageSpec),
    StyleBundle(StyleBundleSpec),
    Asset(AssetSpec),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Component(_) => ResourceKind::Component,
            Resource::Page(_) => ResourceKind::Page,
            Resource::StyleBundle(_) => ResourceKind::StyleBundle,
            Resource::Asset(_) => ResourceKind::Asset,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Component(c) => &c.name,
            Resource::Page(p) => &p.name,
            Resource::StyleBundle(s) => &s.name,
            Resource::Asset(a) => &a.name,
        }
    }

    pub fn deleted(&self) -> bool {
        match self {
            Resource::Component(c) => c.deleted,
            Resource::Page(p) => p.deleted,
            Resource::StyleBundle(s) => s.deleted,
            Resource::Asset(a) => a.deleted,
        }
    }

    /// Tar entries this resource references, with their declared hashes.
    ///
    /// Presence of `file`/`hash` on non-deleted resources is enforced by
    /// the decoder, not here.
    pub fn file_refs(&self) -> Vec<FileRef> {
        fn single(file: &Option<String>, hash: &Option<String>) -> Vec<FileRef> {
            match (file, hash) {
                (Some(file), Some(hash)) => vec![FileRef {
                    file: file.clone(),
                    hash: hash.clone(),
                }],
                _ => Vec::new(),
            }
        }

        match self {
            Resource::Component(c) => single(&c.file, &c.hash),
            Resource::Page(p) => single(&p.file, &p.hash),
            Resource::StyleBundle(s) => s.files.clone(),
            Resource::Asset(a) => single(&a.file, &a.hash),
        }
    }
}

/// The closed set of resource kinds. Full-mode reconciliation iterates this
/// once per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Component,
    Page,
    StyleBundle,
    Asset,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Component,
        ResourceKind::Page,
        ResourceKind::StyleBundle,
        ResourceKind::Asset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Component => "Component",
            ResourceKind::Page => "Page",
            ResourceKind::StyleBundle => "StyleBundle",
            ResourceKind::Asset => "Asset",
        }
    }
}

/// A `file` + declared `hash` pair. Hashes may be bare hex or
/// `sha256:`-prefixed; normalization happens during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub file: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    pub name: String,
    /// Route the page is served at; defaults to `/<name>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Page-level head metadata (arbitrary JSON object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBundleSpec {
    pub name: String,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSpec {
    /// Asset filename (e.g. `assets/logo.svg`).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}
