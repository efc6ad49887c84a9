//! Desired-state snapshot.
//!
//! The release builder freezes the catalog's view of a website into a
//! `ReleaseManifest`, which is stored on the release row, written as the
//! `.manifest.json` sidecar, and mapped onto the release directory's logical
//! paths. For a fixed desired state the entry list is identical across
//! builds: sorted by output path, content addressed by hash.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hsd_bundle::manifest::{FileRef, WebsiteDefaults};
use hsd_catalog::{Catalog, CatalogError, EnvironmentRow, WebsiteRow};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manifest model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseManifest {
    pub website: String,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<WebsiteDefaults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Value>,
    pub pages: Vec<PageSnapshot>,
    pub components: Vec<ComponentSnapshot>,
    pub style_bundles: Vec<StyleBundleSnapshot>,
    pub assets: Vec<AssetSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub name: String,
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Value>,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBundleSnapshot {
    pub name: String,
    pub files: Vec<FileRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub hash: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshotting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Freeze the current desired state for one environment.
pub async fn desired_state(
    catalog: &Catalog,
    website: &WebsiteRow,
    environment: &EnvironmentRow,
) -> Result<ReleaseManifest, CatalogError> {
    let pages = catalog
        .list_pages(website.id)
        .await?
        .into_iter()
        .map(|row| {
            Ok(PageSnapshot {
                name: row.name,
                route: row.route,
                head: parse_optional_json(row.head_json.as_deref())?,
                hash: row.content_hash,
            })
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;

    let components = catalog
        .list_components(website.id)
        .await?
        .into_iter()
        .map(|row| ComponentSnapshot {
            name: row.name,
            hash: row.content_hash,
        })
        .collect();

    let style_bundles = catalog
        .list_style_bundles(website.id)
        .await?
        .into_iter()
        .map(|row| {
            Ok(StyleBundleSnapshot {
                name: row.name,
                files: serde_json::from_str(&row.files_json)?,
            })
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;

    let assets = catalog
        .list_assets(website.id)
        .await?
        .into_iter()
        .map(|row| AssetSnapshot {
            name: row.filename,
            content_type: row.content_type,
            hash: row.content_hash,
        })
        .collect();

    let defaults = match (&website.default_style_bundle, &website.base_template) {
        (None, None) => None,
        (style_bundle, base_template) => Some(WebsiteDefaults {
            style_bundle: style_bundle.clone(),
            base_template: base_template.clone(),
        }),
    };

    Ok(ReleaseManifest {
        website: website.name.clone(),
        environment: environment.name.clone(),
        defaults,
        head: parse_optional_json(website.head_json.as_deref())?,
        pages,
        components,
        style_bundles,
        assets,
    })
}

fn parse_optional_json(raw: Option<&str>) -> Result<Option<Value>, CatalogError> {
    match raw {
        Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_str(raw)?)),
        _ => Ok(None),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logical output paths
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where one output file's content comes from.
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Stream from the blob store.
    Blob(String),
    /// Generated content (`website.yaml`).
    Inline(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct MaterializedEntry {
    pub path: String,
    pub source: EntrySource,
}

impl ReleaseManifest {
    /// The full output file list, sorted by path. Build order follows this
    /// list, which makes builds deterministic for a fixed desired state.
    pub fn entries(&self) -> Vec<MaterializedEntry> {
        let mut entries = Vec::new();

        for page in &self.pages {
            entries.push(MaterializedEntry {
                path: page_output_path(&page.route, &page.name),
                source: EntrySource::Blob(page.hash.clone()),
            });
        }
        for component in &self.components {
            entries.push(MaterializedEntry {
                path: format!("components/{}.html", component.name),
                source: EntrySource::Blob(component.hash.clone()),
            });
        }
        for bundle in &self.style_bundles {
            for file in &bundle.files {
                entries.push(MaterializedEntry {
                    path: style_output_path(&file.file),
                    source: EntrySource::Blob(file.hash.clone()),
                });
            }
        }
        for asset in &self.assets {
            entries.push(MaterializedEntry {
                path: asset_output_path(&asset.name),
                source: EntrySource::Blob(asset.hash.clone()),
            });
        }

        if self.defaults.is_some() || self.head.is_some() {
            entries.push(MaterializedEntry {
                path: "website.yaml".to_owned(),
                source: EntrySource::Inline(self.website_yaml()),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Generated `website.yaml` content: name, defaults, head metadata.
    fn website_yaml(&self) -> Vec<u8> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct WebsiteYaml<'a> {
            website: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            defaults: &'a Option<WebsiteDefaults>,
            #[serde(skip_serializing_if = "Option::is_none")]
            head: &'a Option<Value>,
        }
        serde_yaml::to_string(&WebsiteYaml {
            website: &self.website,
            defaults: &self.defaults,
            head: &self.head,
        })
        .unwrap_or_default()
        .into_bytes()
    }
}

/// Map a page route onto its output file: `/` → `index.html`, `/docs` →
/// `docs/index.html`. An empty route falls back to the page name.
pub fn page_output_path(route: &str, name: &str) -> String {
    let trimmed = route.trim().trim_matches('/');
    if trimmed.is_empty() {
        if route.trim().starts_with('/') || name == "index" {
            "index.html".to_owned()
        } else {
            format!("{name}/index.html")
        }
    } else {
        format!("{trimmed}/index.html")
    }
}

fn style_output_path(file: &str) -> String {
    let file = file.trim_start_matches('/');
    if file.starts_with("styles/") {
        file.to_owned()
    } else {
        format!("styles/{file}")
    }
}

fn asset_output_path(name: &str) -> String {
    let name = name.trim_start_matches('/');
    if name.starts_with("assets/") {
        name.to_owned()
    } else {
        format!("assets/{name}")
    }
}
