use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingBlobStore {
    uploads: Arc<Mutex<Vec<(String, usize)>>>,
    deletes: Arc<Mutex<Vec<String>>>,
    fail_upload: bool,
    fail_get_url: bool,
    fail_delete: bool,
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload(&self, bytes: &[u8], path: &str) -> anyhow::Result<()> {
        if self.fail_upload {
            return Err(anyhow!("payload rejected"));
        }
        self.uploads
            .lock()
            .await
            .push((path.to_string(), bytes.len()));
        Ok(())
    }

    async fn get_url(&self, path: &str) -> anyhow::Result<String> {
        if self.fail_get_url {
            return Err(anyhow!("url service unreachable"));
        }
        Ok(format!("https://blobs.test/{path}"))
    }

    async fn delete_by_path(&self, path: &str) -> anyhow::Result<()> {
        if self.fail_delete {
            return Err(anyhow!("blob store unreachable"));
        }
        self.deletes.lock().await.push(path.to_string());
        Ok(())
    }
}

fn manager(store: RecordingBlobStore) -> (AttachmentManager, Arc<RecordingBlobStore>) {
    let store = Arc::new(store);
    (AttachmentManager::new(store.clone()), store)
}

#[tokio::test]
async fn upload_returns_paired_url_and_path() {
    let (manager, store) = manager(RecordingBlobStore::default());

    let stored = manager
        .upload(b"png-bytes", "photo.png")
        .await
        .expect("upload");

    assert!(stored.path.starts_with("chat/"));
    assert!(stored.path.ends_with("-photo.png"));
    assert_eq!(stored.url, format!("https://blobs.test/{}", stored.path));

    let uploads = store.uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0], (stored.path.clone(), b"png-bytes".len()));
}

#[tokio::test]
async fn storage_paths_are_unique_per_upload() {
    let (manager, _) = manager(RecordingBlobStore::default());

    let first = manager.upload(b"a", "photo.png").await.expect("first");
    let second = manager.upload(b"b", "photo.png").await.expect("second");
    assert_ne!(first.path, second.path);
}

#[tokio::test]
async fn hostile_file_names_are_sanitized() {
    let (manager, _) = manager(RecordingBlobStore::default());

    let stored = manager
        .upload(b"x", "../../etc/pass wd")
        .await
        .expect("upload");

    let name = stored.path.strip_prefix("chat/").expect("prefix");
    assert!(!name.contains('/'));
    assert!(stored.path.ends_with(".._.._etc_pass_wd"));
}

#[tokio::test]
async fn empty_file_names_fall_back_to_a_placeholder() {
    let (manager, _) = manager(RecordingBlobStore::default());

    let stored = manager.upload(b"x", "").await.expect("upload");
    assert!(stored.path.ends_with("-attachment"));
}

#[tokio::test]
async fn upload_failure_is_fatal_and_stores_nothing() {
    let (manager, store) = manager(RecordingBlobStore {
        fail_upload: true,
        ..RecordingBlobStore::default()
    });

    let err = manager.upload(b"x", "photo.png").await.expect_err("fail");
    assert!(matches!(err, AttachmentError::Upload(_)));
    assert!(store.uploads.lock().await.is_empty());
}

#[tokio::test]
async fn url_mint_failure_reclaims_the_stored_blob() {
    let (manager, store) = manager(RecordingBlobStore {
        fail_get_url: true,
        ..RecordingBlobStore::default()
    });

    let err = manager.upload(b"x", "photo.png").await.expect_err("fail");
    assert!(matches!(err, AttachmentError::Upload(_)));

    let uploads = store.uploads.lock().await;
    let deletes = store.deletes.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(deletes.as_slice(), &[uploads[0].0.clone()]);
}

#[tokio::test]
async fn delete_failure_maps_to_cleanup_error_with_path() {
    let (manager, _) = manager(RecordingBlobStore {
        fail_delete: true,
        ..RecordingBlobStore::default()
    });

    let err = manager
        .delete("chat/abc-photo.png")
        .await
        .expect_err("fail");
    match err {
        AttachmentError::Cleanup { path, .. } => assert_eq!(path, "chat/abc-photo.png"),
        other => panic!("unexpected error variant: {other:?}"),
    }
}

#[test]
fn storage_path_keeps_safe_characters() {
    let path = storage_path("report-v2_final.pdf");
    assert!(path.ends_with("-report-v2_final.pdf"));
}
