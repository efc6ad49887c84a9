//! Shared fixtures for engine and API tests.

use std::sync::Arc;

use hsd_blobstore::BlobStore;
use hsd_catalog::Catalog;

use crate::engine::Deployer;
use crate::proxy::RecordingReloader;
use crate::runtime::audit::AuditPipeline;
use crate::runtime::locks::StripeLocks;

/// A full deployer over a temp data dir, with a recording proxy reloader.
pub async fn deployer() -> (tempfile::TempDir, Deployer, Arc<RecordingReloader>) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(&dir.path().join("db.sqlite")).await.unwrap();
    let blobs = BlobStore::open(dir.path()).await.unwrap();
    let audit = Arc::new(AuditPipeline::spawn(catalog.clone(), 512));
    let reloader = Arc::new(RecordingReloader::new());

    let deployer = Deployer {
        catalog,
        blobs,
        locks: Arc::new(StripeLocks::new()),
        audit,
        reloader: reloader.clone(),
        data_dir: dir.path().to_path_buf(),
    };
    (dir, deployer, reloader)
}

/// Decode a bundle built by `hsd_bundle::testutil::BundleBuilder`.
pub fn decode(builder: &hsd_bundle::testutil::BundleBuilder) -> hsd_bundle::Bundle {
    hsd_bundle::decode(&builder.build_tar()).unwrap()
}
