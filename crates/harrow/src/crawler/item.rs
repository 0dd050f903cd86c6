//! File-like items flowing through the processing pool.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use harrow_db::NewFile;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One unit of discovered work.
#[derive(Debug, Clone)]
pub enum CrawlItem {
    File(FileMeta),
    /// A version-control root; routed to the git extractor, which yields
    /// blob-shaped items of its own.
    GitRepo(PathBuf),
}

/// A discovered file plus the metadata the ledger needs. The content hash
/// is computed lazily by [`FileMeta::to_new_file`], after the cheap
/// size/path policy checks have run.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub path: PathBuf,
    pub path_virtual: String,
    pub filename: String,
    pub extension: String,
    pub mime_type: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl FileMeta {
    pub fn from_path(base: &Path, path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let modified = to_utc(meta.modified().ok());
        Ok(Self {
            path_virtual: virtual_path(base, path),
            filename: filename.clone(),
            mime_type: mime_for_extension(&extension).to_string(),
            extension,
            size: meta.len(),
            created: to_utc(meta.created().ok()).min(modified),
            last_accessed: to_utc(meta.accessed().ok()),
            last_modified: modified,
            path: path.to_path_buf(),
        })
    }

    /// Hash the content and produce the ledger row. The fingerprint is the
    /// hash of the content hash plus the lowercase filename, so renaming a
    /// file re-admits it while a pure re-crawl does not.
    pub fn to_new_file(&self) -> Result<NewFile> {
        let content_hash = hash_file(&self.path)?;
        Ok(NewFile {
            fingerprint: fingerprint(&content_hash, &self.filename),
            filename: self.filename.clone(),
            extension: self.extension.clone(),
            mime_type: self.mime_type.clone(),
            file_size: self.size as i64,
            created: self.created,
            last_accessed: self.last_accessed,
            last_modified: self.last_modified,
            indexed_at: Utc::now(),
            path_real: self.path.to_string_lossy().to_string(),
            path_virtual: self.path_virtual.clone(),
        })
    }
}

/// Dedup key: content hash + lowercase filename.
pub fn fingerprint(content_hash: &str, filename: &str) -> String {
    blake3::hash(format!("{}_{}", content_hash, filename.to_lowercase()).as_bytes())
        .to_hex()
        .to_string()
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Logical path relative to the crawl root, with forward slashes on every
/// platform.
pub fn virtual_path(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_utc(time: Option<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_else(Utc::now)
}

/// Extension-keyed MIME lookup. Deliberately a narrow table: content-based
/// sniffing belongs to an external collaborator, not the pipeline.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "txt" | "text" | "log" | "cfg" | "conf" | "config" | "ini" | "env" | "properties" => {
            "text/plain"
        }
        "json" => "application/json",
        "yml" | "yaml" => "application/yaml",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "sh" | "bash" | "zsh" => "application/x-sh",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "js" | "mjs" => "text/javascript",
        "ts" => "text/typescript",
        "java" => "text/x-java-source",
        "go" => "text/x-go",
        "rb" => "text/x-ruby",
        "php" => "text/x-php",
        "sql" => "application/sql",
        "toml" => "application/toml",
        "pem" | "crt" | "cer" => "application/x-pem-file",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "" => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_filename_case() {
        assert_eq!(fingerprint("abc", "Config.TXT"), fingerprint("abc", "config.txt"));
        assert_ne!(fingerprint("abc", "a.txt"), fingerprint("abd", "a.txt"));
    }

    #[test]
    fn virtual_paths_are_root_relative_forward_slash() {
        let base = Path::new("/data/crawl");
        let path = Path::new("/data/crawl/sub/dir/creds.txt");
        assert_eq!(virtual_path(base, path), "sub/dir/creds.txt");
    }

    #[test]
    fn mime_lookup_falls_back_to_octet_stream() {
        assert_eq!(mime_for_extension("json"), "application/json");
        assert_eq!(mime_for_extension("weird"), "application/octet-stream");
    }
}
