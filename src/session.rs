#![cfg(not(tarpaulin_include))]

use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the pending upload id
pub const UPLOAD_COOKIE: &str = "upload_id";

/// How long an uploaded file waits for a column choice before it is swept
pub const UPLOAD_TTL: Duration = Duration::from_secs(60 * 60);

/// A spreadsheet that has been uploaded but not classified yet
#[derive(Debug, Clone)]
pub struct PendingUpload {
    /// Where the file was written
    pub path: PathBuf,

    /// File name as sent by the browser
    pub original_name: String,

    pub created: SystemTime,
}

/// Pending uploads keyed by an opaque id.
///
/// The id is the only thing handed to the browser; the file path never
/// leaves the server.
#[derive(Debug, Default)]
pub struct UploadRegistry {
    uploads: RwLock<HashMap<String, PendingUpload>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an upload and returns its id.
    ///
    /// Uploads older than [`UPLOAD_TTL`] are swept first and their files
    /// removed (best effort).
    pub fn register(&self, upload: PendingUpload) -> String {
        for stale in self.expire_older_than(UPLOAD_TTL) {
            remove_upload_file(&stale.path);
        }

        let id = Uuid::new_v4().to_string();
        if let Ok(mut uploads) = self.uploads.write() {
            uploads.insert(id.clone(), upload);
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<PendingUpload> {
        self.uploads.read().ok()?.get(id).cloned()
    }

    pub fn take(&self, id: &str) -> Option<PendingUpload> {
        self.uploads.write().ok()?.remove(id)
    }

    pub fn len(&self) -> usize {
        self.uploads.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns uploads created more than `ttl` ago.
    pub fn expire_older_than(&self, ttl: Duration) -> Vec<PendingUpload> {
        let now = SystemTime::now();
        let Ok(mut uploads) = self.uploads.write() else {
            return Vec::new();
        };

        let stale: Vec<String> = uploads
            .iter()
            .filter(|(_, upload)| {
                now.duration_since(upload.created)
                    .map(|age| age > ttl)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| uploads.remove(&id))
            .collect()
    }
}

/// Deletes an upload's file. Failure is logged, never returned.
pub fn remove_upload_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed temporary file {}", path.display()),
        Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
    }
}

/// Makes a browser-supplied file name safe to use inside the upload dir.
///
/// Directory components are dropped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = unsafe_chars.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(path: &str, age: Duration) -> PendingUpload {
        PendingUpload {
            path: PathBuf::from(path),
            original_name: path.to_string(),
            created: SystemTime::now() - age,
        }
    }

    #[test]
    fn register_get_take() {
        let registry = UploadRegistry::new();
        let id = registry.register(upload("a.xlsx", Duration::ZERO));

        assert_eq!(registry.get(&id).unwrap().path, PathBuf::from("a.xlsx"));
        assert!(registry.take(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.take(&id).is_none());
    }

    #[test]
    fn ids_are_unique() {
        let registry = UploadRegistry::new();
        let a = registry.register(upload("a.xlsx", Duration::ZERO));
        let b = registry.register(upload("b.xlsx", Duration::ZERO));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn stale_uploads_expire() {
        let registry = UploadRegistry::new();
        let fresh = registry.register(upload("fresh.xlsx", Duration::ZERO));
        let old = registry.register(upload("old.xlsx", Duration::from_secs(7200)));

        let expired = registry.expire_older_than(UPLOAD_TTL);
        assert_eq!(expired.len(), 1);
        assert!(registry.get(&old).is_none());
        assert!(registry.get(&fresh).is_some());
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_filename("survey 2024.xlsx"), "survey_2024.xlsx");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\data.csv"), "data.csv");
        assert_eq!(sanitize_filename(".hidden.xlsx"), "hidden.xlsx");
        assert_eq!(sanitize_filename(""), "upload");
    }
}
