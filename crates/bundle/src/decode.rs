//! Tar decoding and bundle validation.
//!
//! Accepts a plain tar or a gzip-compressed tar (sniffed by magic bytes).
//! Entries are validated before anything else looks at them: absolute paths
//! and `..` components are rejected outright. The decoder never writes to
//! disk — the caller decides what (if anything) gets persisted.

use std::collections::HashMap;
use std::io::Read;
use std::path::Component;

use flate2::read::GzDecoder;
use tar::Archive;

use hsd_domain::ContentHash;

use crate::manifest::{Manifest, Resource, API_VERSION, MANIFEST_KIND, MANIFEST_PATH};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("archive invalid: {0}")]
    Archive(String),
    #[error("manifest invalid: {0}")]
    Manifest(String),
    #[error("bundle failed validation")]
    Validation(ValidationError),
}

/// Files the manifest references but the tar lacks, and files whose content
/// does not match the declared hash.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub missing_files: Vec<String>,
    pub hash_mismatches: Vec<HashMismatch>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashMismatch {
    pub file: String,
    pub declared: String,
    pub actual: String,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing_files.is_empty() && self.hash_mismatches.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoded bundle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A decoded, hash-validated bundle.
#[derive(Debug)]
pub struct Bundle {
    pub manifest: Manifest,
    /// Tar entry path → file bytes (manifest excluded).
    pub files: HashMap<String, Vec<u8>>,
    /// Canonicalized declared hash per referenced file path.
    pub hashes: HashMap<String, ContentHash>,
    /// Tar entries referenced by no manifest resource (ExtraFiles warning).
    pub extra_files: Vec<String>,
}

impl Bundle {
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode and validate a bundle from raw tar (or tar.gz) bytes.
pub fn decode(bytes: &[u8]) -> Result<Bundle, BundleError> {
    let entries = read_entries(bytes)?;

    let manifest_bytes = entries
        .get(MANIFEST_PATH)
        .ok_or_else(|| BundleError::Manifest(format!("{MANIFEST_PATH} missing")))?;
    let manifest: Manifest = serde_json::from_slice(manifest_bytes)
        .map_err(|e| BundleError::Manifest(format!("{MANIFEST_PATH}: {e}")))?;

    if manifest.kind != MANIFEST_KIND {
        return Err(BundleError::Manifest(format!(
            "kind must be {MANIFEST_KIND:?}, got {:?}",
            manifest.kind
        )));
    }
    if manifest.api_version != API_VERSION {
        return Err(BundleError::Manifest(format!(
            "unsupported apiVersion {:?}",
            manifest.api_version
        )));
    }

    let mut files: HashMap<String, Vec<u8>> = entries;
    files.remove(MANIFEST_PATH);

    // Every non-deleted resource must declare its files, and each declared
    // file must exist with matching content.
    let mut validation = ValidationError::default();
    let mut hashes: HashMap<String, ContentHash> = HashMap::new();
    let mut referenced: Vec<String> = Vec::new();

    for resource in &manifest.resources {
        if resource.deleted() {
            continue;
        }
        let refs = resource.file_refs();
        if refs.is_empty() {
            return Err(BundleError::Manifest(format!(
                "{} {:?} declares no file/hash",
                resource.kind().as_str(),
                resource.name()
            )));
        }
        for file_ref in refs {
            let declared = match ContentHash::parse(&file_ref.hash) {
                Ok(h) => h,
                Err(e) => {
                    return Err(BundleError::Manifest(format!(
                        "{}: {e}",
                        file_ref.file
                    )));
                }
            };
            referenced.push(file_ref.file.clone());

            let Some(bytes) = files.get(&file_ref.file) else {
                validation.missing_files.push(file_ref.file.clone());
                continue;
            };
            let actual = ContentHash::of_bytes(bytes);
            if actual != declared {
                validation.hash_mismatches.push(HashMismatch {
                    file: file_ref.file.clone(),
                    declared: declared.to_string(),
                    actual: actual.to_string(),
                });
                continue;
            }
            hashes.insert(file_ref.file.clone(), declared);
        }
    }

    if !validation.is_empty() {
        return Err(BundleError::Validation(validation));
    }

    let mut extra_files: Vec<String> = files
        .keys()
        .filter(|path| !referenced.iter().any(|r| r == *path))
        .cloned()
        .collect();
    extra_files.sort();

    Ok(Bundle {
        manifest,
        files,
        hashes,
        extra_files,
    })
}

/// Read all regular-file entries, rejecting unsafe paths.
fn read_entries(bytes: &[u8]) -> Result<HashMap<String, Vec<u8>>, BundleError> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };
    let mut archive = Archive::new(reader);

    let mut entries = HashMap::new();
    let iter = archive
        .entries()
        .map_err(|e| BundleError::Archive(e.to_string()))?;
    for entry in iter {
        let mut entry = entry.map_err(|e| BundleError::Archive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| BundleError::Archive(e.to_string()))?;
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(BundleError::Archive(format!(
                "unsafe entry path: {}",
                path.display()
            )));
        }
        let key = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        if key.is_empty() {
            continue;
        }

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| BundleError::Archive(e.to_string()))?;
        entries.insert(key, buf);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ApplyMode;
    use crate::testutil::BundleBuilder;

    #[test]
    fn decodes_a_valid_bundle() {
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .page("index", "/", b"<html>home</html>")
            .component("header", b"<header/>")
            .style_file("default", "styles/default.css", b"body{}")
            .asset("assets/logo.svg", "image/svg+xml", b"<svg/>")
            .build_tar();

        let bundle = decode(&tar).unwrap();
        assert_eq!(bundle.manifest.website, "blog");
        assert_eq!(bundle.manifest.resources.len(), 4);
        assert!(bundle.extra_files.is_empty());
        assert_eq!(bundle.file("pages/index.html").unwrap(), b"<html>home</html>");
        assert_eq!(
            bundle.hashes["components/header.html"],
            ContentHash::of_bytes(b"<header/>")
        );
    }

    #[test]
    fn gzip_input_is_sniffed() {
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .component("header", b"<header/>")
            .build_tar_gz();
        assert!(decode(&tar).is_ok());
    }

    #[test]
    fn missing_manifest_is_a_manifest_error() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"hi";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "loose.txt", &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        assert!(matches!(decode(&bytes), Err(BundleError::Manifest(_))));
    }

    #[test]
    fn hash_mismatch_lists_the_file() {
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .component_with_hash("header", b"<header/>", &"a".repeat(64))
            .build_tar();

        match decode(&tar) {
            Err(BundleError::Validation(v)) => {
                assert_eq!(v.hash_mismatches.len(), 1);
                assert_eq!(v.hash_mismatches[0].file, "components/header.html");
                assert!(v.missing_files.is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn referenced_but_absent_file_is_missing() {
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .resource_without_file("Component", "ghost", "components/ghost.html")
            .build_tar();

        match decode(&tar) {
            Err(BundleError::Validation(v)) => {
                assert_eq!(v.missing_files, vec!["components/ghost.html"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unreferenced_entries_become_extra_files() {
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .component("header", b"<header/>")
            .loose_file("notes/todo.txt", b"ship it")
            .build_tar();

        let bundle = decode(&tar).unwrap();
        assert_eq!(bundle.extra_files, vec!["notes/todo.txt"]);
    }

    #[test]
    fn bare_hex_hashes_match_prefixed_content() {
        let body = b"<header/>";
        let bare = {
            let canonical = ContentHash::of_bytes(body);
            canonical.hex().to_string()
        };
        let tar = BundleBuilder::new("blog", ApplyMode::Partial)
            .component_with_hash("header", body, &bare)
            .build_tar();
        assert!(decode(&tar).is_ok());
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"evil";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "../escape.txt", &data[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        assert!(matches!(decode(&bytes), Err(BundleError::Archive(_))));
    }
}
