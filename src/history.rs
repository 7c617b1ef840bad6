// Wipe history
//
// Lists previously written wipe logs, newest first, and pairs each with the
// certificate artifact generated from it (matched by certificate id).
// Reading is tolerant: files that fail to parse are skipped with a warning
// so one corrupt log never hides the rest of the history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::wipe_log::{WipeLog, WipeStatus};
use crate::WipeMethod;

/// One past wipe, summarized from its log on disk.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub log_path: PathBuf,
    pub device_path: String,
    pub device_name: String,
    pub method: WipeMethod,
    pub status: WipeStatus,
    pub finished_at: String,
    pub certificate: Option<PathBuf>,
}

/// Scan `log_dir` for wipe logs and `cert_dir` for certificate artifacts.
/// Missing directories yield an empty history.
pub fn collect(log_dir: &Path, cert_dir: &Path) -> Vec<HistoryEntry> {
    let certificates = index_certificates(cert_dir);
    let mut dated: Vec<(SystemTime, HistoryEntry)> = Vec::new();

    for path in json_files(log_dir) {
        let log = match WipeLog::try_read(&path) {
            Ok(Some(log)) => log,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable wipe log");
                continue;
            }
        };
        let certificate = log
            .compliance
            .as_ref()
            .and_then(|c| certificates.get(&c.certificate_id).cloned());
        let written = modified_at(&path);
        dated.push((
            written,
            HistoryEntry {
                log_path: path,
                device_path: log.device.path,
                device_name: log.device.name,
                method: log.wipe.method,
                status: log.wipe.status,
                finished_at: log.wipe.finished_at,
                certificate,
            },
        ));
    }

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().map(|(_, entry)| entry).collect()
}

// certificate id -> artifact path, accepting either id key the certifiers use
fn index_certificates(cert_dir: &Path) -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    for path in json_files(cert_dir) {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            tracing::debug!(path = %path.display(), "certificate artifact is not JSON, ignoring");
            continue;
        };
        for key in ["certificate_id", "uuid"] {
            if let Some(id) = value.get(key).and_then(|v| v.as_str()) {
                index.insert(id.to_string(), path.clone());
                break;
            }
        }
    }
    index
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("*.json").display().to_string();
    match glob::glob(&pattern) {
        Ok(paths) => paths.flatten().collect(),
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "history pattern rejected");
            Vec::new()
        }
    }
}

fn modified_at(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostFacts;
    use crate::scan;
    use crate::{Platform, WipeRequest};
    use chrono::Utc;

    fn write_log(dir: &Path, file: &str) -> WipeLog {
        let request = WipeRequest::new("/dev/sdz", WipeMethod::Purge)
            .with_device(scan::mock_device(Platform::Unix));
        let log = WipeLog::synthetic(
            &request,
            &HostFacts::collect(Some("tester")),
            Utc::now(),
            Utc::now(),
        );
        log.write_with_fallback(&dir.join(file)).unwrap();
        log
    }

    #[test]
    fn test_missing_directories_yield_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let entries = collect(&dir.path().join("logs"), &dir.path().join("certs"));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_entry_reflects_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path(), "wipe.json");

        let entries = collect(dir.path(), &dir.path().join("certs"));
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.device_path, "/dev/sdz");
        assert_eq!(entry.device_name, "Mock USB Drive");
        assert_eq!(entry.method, WipeMethod::Purge);
        assert_eq!(entry.status, WipeStatus::Success);
        assert_eq!(entry.finished_at, log.wipe.finished_at);
        assert!(entry.certificate.is_none());
    }

    #[test]
    fn test_certificate_is_matched_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let cert_dir = dir.path().join("certs");
        std::fs::create_dir_all(&cert_dir).unwrap();
        let log = write_log(dir.path(), "wipe.json");

        let id = log.compliance.as_ref().unwrap().certificate_id.clone();
        let cert_path = cert_dir.join("cert_1.json");
        std::fs::write(
            &cert_path,
            serde_json::json!({ "certificate_id": id, "mock": true }).to_string(),
        )
        .unwrap();
        // an unrelated artifact must not be picked up
        std::fs::write(
            cert_dir.join("cert_2.json"),
            serde_json::json!({ "certificate_id": "someone-else" }).to_string(),
        )
        .unwrap();

        let entries = collect(dir.path(), &cert_dir);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].certificate.as_deref(), Some(cert_path.as_path()));
    }

    #[test]
    fn test_uuid_key_also_matches() {
        let dir = tempfile::tempdir().unwrap();
        let cert_dir = dir.path().join("certs");
        std::fs::create_dir_all(&cert_dir).unwrap();
        let log = write_log(dir.path(), "wipe.json");

        let id = log.compliance.as_ref().unwrap().certificate_id.clone();
        std::fs::write(
            cert_dir.join("legacy.json"),
            serde_json::json!({ "uuid": id }).to_string(),
        )
        .unwrap();

        let entries = collect(dir.path(), &cert_dir);
        assert!(entries[0].certificate.is_some());
    }

    #[test]
    fn test_corrupt_log_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "good.json");
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let entries = collect(dir.path(), &dir.path().join("certs"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].device_path, "/dev/sdz");
    }

    #[test]
    fn test_newest_log_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "older.json");
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_log(dir.path(), "newer.json");

        let entries = collect(dir.path(), &dir.path().join("certs"));
        assert_eq!(entries.len(), 2);
        assert!(entries[0].log_path.ends_with("newer.json"));
        assert!(entries[1].log_path.ends_with("older.json"));
    }
}
