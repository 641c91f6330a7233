//! Saving downloaded exports to disk.

use crate::client::{Download, DownloadTarget};
use crate::error::WatchdogError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Reduce a server-suggested filename to a safe final path component.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}

/// File extension for a `Content-Type` header value.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match essence.as_deref() {
        Some("text/csv") | Some("application/csv") => "csv",
        Some("application/json") => "json",
        _ => "txt",
    }
}

/// Name for the saved file: the server's choice if usable, else derived.
pub fn file_name_for(download: &Download, target: &DownloadTarget) -> String {
    download
        .filename
        .as_deref()
        .and_then(sanitize_filename)
        .unwrap_or_else(|| {
            format!(
                "{}.{}",
                target.default_stem(),
                extension_for(download.content_type.as_deref())
            )
        })
}

/// Where to write: `output` as a file, inside `output` if it is a
/// directory, or the working directory when not given.
pub fn destination(output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        None => PathBuf::from(file_name),
        Some(path) if path.is_dir() || path.as_os_str().to_string_lossy().ends_with('/') => {
            path.join(file_name)
        }
        Some(path) => path.to_path_buf(),
    }
}

/// Write a download to disk atomically and return the final path.
pub fn save(
    download: &Download,
    target: &DownloadTarget,
    output: Option<&Path>,
) -> Result<PathBuf, WatchdogError> {
    let path = destination(output, &file_name_for(download, target));
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&parent).map_err(|e| {
        WatchdogError::Io(format!("Failed to create {}: {}", parent.display(), e))
    })?;

    let mut file = NamedTempFile::new_in(&parent)?;
    file.write_all(&download.bytes)?;
    file.flush()?;
    debug!("Wrote {} bytes to {}", download.bytes.len(), file.path().display());

    file.persist(&path).map_err(|e| {
        WatchdogError::Io(format!("Failed to save {}: {}", path.display(), e.error))
    })?;

    info!("Saved {}", path.display());
    Ok(path)
}
