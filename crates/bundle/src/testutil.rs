//! Test support: programmatic bundle construction.
//!
//! Builds a manifest + file set and serializes them to tar (or tar.gz)
//! exactly the way a client would. Compiled for this crate's own tests and,
//! behind the `testutil` feature, for downstream engine tests.

use std::io::Write;

use serde_json::{json, Value};

use hsd_domain::ContentHash;

use crate::manifest::ApplyMode;

pub struct BundleBuilder {
    website: String,
    mode: ApplyMode,
    defaults: Option<Value>,
    head: Option<Value>,
    resources: Vec<Value>,
    /// StyleBundle name → accumulated file refs.
    style_bundles: Vec<(String, Vec<Value>)>,
    files: Vec<(String, Vec<u8>)>,
}

impl BundleBuilder {
    pub fn new(website: &str, mode: ApplyMode) -> Self {
        Self {
            website: website.to_owned(),
            mode,
            defaults: None,
            head: None,
            resources: Vec::new(),
            style_bundles: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn defaults(mut self, style_bundle: &str, base_template: &str) -> Self {
        self.defaults = Some(json!({
            "styleBundle": style_bundle,
            "baseTemplate": base_template,
        }));
        self
    }

    pub fn head(mut self, head: Value) -> Self {
        self.head = Some(head);
        self
    }

    pub fn page(self, name: &str, route: &str, body: &[u8]) -> Self {
        self.page_with_head(name, route, body, None)
    }

    pub fn page_with_head(
        mut self,
        name: &str,
        route: &str,
        body: &[u8],
        head: Option<Value>,
    ) -> Self {
        let file = format!("pages/{name}.html");
        let mut resource = json!({
            "kind": "Page",
            "name": name,
            "route": route,
            "file": file,
            "hash": ContentHash::of_bytes(body).to_string(),
        });
        if let Some(head) = head {
            resource["head"] = head;
        }
        self.resources.push(resource);
        self.files.push((file, body.to_vec()));
        self
    }

    pub fn component(self, name: &str, body: &[u8]) -> Self {
        let hash = ContentHash::of_bytes(body).to_string();
        self.component_with_hash(name, body, &hash)
    }

    /// Component whose declared hash may deliberately disagree with `body`.
    pub fn component_with_hash(mut self, name: &str, body: &[u8], hash: &str) -> Self {
        let file = format!("components/{name}.html");
        self.resources.push(json!({
            "kind": "Component",
            "name": name,
            "file": file,
            "hash": hash,
        }));
        self.files.push((file, body.to_vec()));
        self
    }

    /// Add one file to a StyleBundle resource (created on first use).
    pub fn style_file(mut self, bundle_name: &str, file: &str, body: &[u8]) -> Self {
        let file_ref = json!({
            "file": file,
            "hash": ContentHash::of_bytes(body).to_string(),
        });
        match self
            .style_bundles
            .iter_mut()
            .find(|(name, _)| name == bundle_name)
        {
            Some((_, refs)) => refs.push(file_ref),
            None => self
                .style_bundles
                .push((bundle_name.to_owned(), vec![file_ref])),
        }
        self.files.push((file.to_owned(), body.to_vec()));
        self
    }

    pub fn asset(mut self, name: &str, content_type: &str, body: &[u8]) -> Self {
        self.resources.push(json!({
            "kind": "Asset",
            "name": name,
            "file": name,
            "hash": ContentHash::of_bytes(body).to_string(),
            "contentType": content_type,
        }));
        self.files.push((name.to_owned(), body.to_vec()));
        self
    }

    /// A `deleted: true` marker for any kind.
    pub fn deleted(mut self, kind: &str, name: &str) -> Self {
        self.resources.push(json!({
            "kind": kind,
            "name": name,
            "deleted": true,
        }));
        self
    }

    /// Declare a resource whose referenced file is absent from the tar.
    pub fn resource_without_file(mut self, kind: &str, name: &str, file: &str) -> Self {
        self.resources.push(json!({
            "kind": kind,
            "name": name,
            "file": file,
            "hash": ContentHash::of_bytes(b"placeholder").to_string(),
        }));
        self
    }

    /// A tar entry referenced by no resource.
    pub fn loose_file(mut self, path: &str, body: &[u8]) -> Self {
        self.files.push((path.to_owned(), body.to_vec()));
        self
    }

    pub fn manifest_value(&self) -> Value {
        let mut resources = self.resources.clone();
        for (name, refs) in &self.style_bundles {
            resources.push(json!({
                "kind": "StyleBundle",
                "name": name,
                "files": refs,
            }));
        }
        let mut manifest = json!({
            "apiVersion": crate::manifest::API_VERSION,
            "kind": crate::manifest::MANIFEST_KIND,
            "mode": self.mode.as_str(),
            "website": self.website,
            "resources": resources,
        });
        if let Some(defaults) = &self.defaults {
            manifest["defaults"] = defaults.clone();
        }
        if let Some(head) = &self.head {
            manifest["head"] = head.clone();
        }
        manifest
    }

    pub fn build_tar(&self) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let manifest = serde_json::to_vec_pretty(&self.manifest_value()).unwrap();
        append(&mut builder, crate::manifest::MANIFEST_PATH, &manifest);
        for (path, body) in &self.files {
            append(&mut builder, path, body);
        }

        builder.into_inner().unwrap()
    }

    pub fn build_tar_gz(&self) -> Vec<u8> {
        let tar = self.build_tar();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap()
    }
}

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}
