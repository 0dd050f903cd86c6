//! Narrow git-history extractor.
//!
//! Shells out to the `git` binary rather than linking a libgit2 stack:
//! `rev-list --objects --all` enumerates every reachable object once, and
//! `cat-file --batch` streams typed contents back. Each blob becomes a
//! file-shaped item so history scans reuse the regular processing path.
//! Failures here are logged and skipped by the caller, never fatal.

use anyhow::{anyhow, bail, Context, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// One historical blob with the path it was last seen under.
#[derive(Debug, Clone)]
pub struct GitBlob {
    pub object_id: String,
    pub path: String,
    pub content: Vec<u8>,
}

pub struct GitHistory {
    git_dir: PathBuf,
}

impl GitHistory {
    /// `git_dir` is the `.git` directory itself.
    pub fn new(git_dir: &Path) -> Self {
        Self {
            git_dir: git_dir.to_path_buf(),
        }
    }

    /// All reachable blobs across all refs, skipping anything larger than
    /// `max_size` bytes.
    pub fn blobs(&self, max_size: Option<u64>) -> Result<Vec<GitBlob>> {
        let candidates = self.list_objects()?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.read_blobs(&candidates, max_size)
    }

    /// `rev-list --objects --all`: one line per object, `<oid> <path>` for
    /// blobs and trees, bare `<oid>` for commits.
    fn list_objects(&self) -> Result<Vec<(String, String)>> {
        let output = self
            .git("rev-list")
            .args(["--objects", "--all"])
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    anyhow!("the 'git' binary is not on PATH")
                } else {
                    anyhow!("failed to spawn git rev-list: {err}")
                }
            })?;
        if !output.status.success() {
            bail!(
                "git rev-list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let mut objects = Vec::new();
        for line in output.stdout.as_slice().lines() {
            let line = line.context("reading rev-list output")?;
            if let Some((oid, path)) = line.split_once(' ') {
                if !path.is_empty() {
                    objects.push((oid.to_string(), path.to_string()));
                }
            }
        }
        Ok(objects)
    }

    /// Stream object contents through one `cat-file --batch` process. The
    /// candidate list still contains trees; the typed response header is
    /// what filters them out.
    fn read_blobs(
        &self,
        candidates: &[(String, String)],
        max_size: Option<u64>,
    ) -> Result<Vec<GitBlob>> {
        let mut child = self
            .git("cat-file")
            .arg("--batch")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn git cat-file")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("missing cat-file stdin"))?;
        for (oid, _) in candidates {
            writeln!(stdin, "{oid}").context("writing to cat-file")?;
        }
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("missing cat-file stdout"))?;
        let mut reader = BufReader::new(stdout);

        let mut blobs = Vec::new();
        for (oid, path) in candidates {
            let mut header = String::new();
            if reader.read_line(&mut header).context("reading cat-file header")? == 0 {
                break;
            }
            let mut parts = header.split_whitespace();
            let (Some(_id), Some(kind), Some(size)) = (parts.next(), parts.next(), parts.next())
            else {
                // "<oid> missing" and other malformed headers end the object.
                continue;
            };
            let size: u64 = size.parse().unwrap_or(0);

            // Content plus the trailing newline cat-file appends.
            let mut content = vec![0u8; size as usize];
            reader.read_exact(&mut content).context("reading cat-file content")?;
            let mut newline = [0u8; 1];
            reader.read_exact(&mut newline).context("reading cat-file separator")?;

            if kind != "blob" {
                continue;
            }
            if let Some(limit) = max_size {
                if size > limit {
                    debug!(oid, size, "skipping oversized blob");
                    continue;
                }
            }

            blobs.push(GitBlob {
                object_id: oid.clone(),
                path: path.clone(),
                content,
            });
        }

        let _ = child.wait();
        Ok(blobs)
    }

    fn git(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir").arg(&self.git_dir).arg(subcommand);
        cmd
    }
}
