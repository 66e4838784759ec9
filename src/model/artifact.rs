use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One downloadable file backing a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name inside the entry's cache directory.
    pub file: &'static str,
    /// Canonical download location.
    pub url: &'static str,
    /// Digest pinned at build time. Unpinned artifacts are never used.
    pub sha256: Option<&'static str>,
}

impl Artifact {
    /// The pinned digest, or an error naming how to pin one.
    pub fn pinned_digest(&self, entry: &str) -> Result<&'static str> {
        match self.sha256 {
            Some(digest) => Ok(digest),
            None => bail!(
                "no pinned SHA-256 for {}/{}: set {} at build time or add checksums/{}.sha256",
                entry,
                self.file,
                pin_var(entry),
                entry
            ),
        }
    }
}

/// Build-time variable carrying the digest for a cache entry.
pub fn pin_var(entry: &str) -> String {
    format!("GLANCE_SHA256_{}", entry.to_ascii_uppercase().replace('-', "_"))
}

/// On-disk artifact cache rooted at the (redirected) cache directory.
///
/// Layout: `<root>/<entry>/<file>` plus `<file>.sha256`, which is written
/// last and marks the download as complete.
pub struct ArtifactStore {
    root: PathBuf,
    mirror_url: Option<String>,
    agent: ureq::Agent,
}

impl ArtifactStore {
    pub fn new(root: PathBuf, mirror_url: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(10)))
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self {
            root,
            mirror_url: mirror_url.map(|m| m.trim_end_matches('/').to_string()),
            agent,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, entry: &str, artifact: &Artifact) -> PathBuf {
        self.root.join(entry).join(artifact.file)
    }

    pub fn is_cached(&self, entry: &str, artifact: &Artifact) -> bool {
        let Some(pinned) = artifact.sha256 else {
            return false;
        };
        cached_digest(&self.path_of(entry, artifact), pinned).is_some()
    }

    /// Returns the local path of an artifact, downloading it first when the
    /// cache does not hold a complete copy.
    pub fn fetch(&self, entry: &str, artifact: &Artifact) -> Result<PathBuf> {
        let pinned = artifact.pinned_digest(entry)?;
        let dest = self.path_of(entry, artifact);
        if let Some(digest) = cached_digest(&dest, pinned) {
            debug!("{} cached ({})", dest.display(), digest);
            return Ok(dest);
        }

        let dir = self.root.join(entry);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;

        let digest = match &self.mirror_url {
            Some(mirror) => {
                let mirrored = format!("{}/{}/{}", mirror, entry, artifact.file);
                self.download_with_fallback(&mirrored, artifact.url, &dest, pinned)?
            }
            None => self.download(artifact.url, &dest, pinned)?,
        };

        // Written last: acts as the "download complete" marker
        std::fs::write(marker_path(&dest), &digest)?;
        Ok(dest)
    }

    fn download_with_fallback(
        &self,
        url: &str,
        fallback_url: &str,
        dest: &Path,
        expected_sha256: &str,
    ) -> Result<String> {
        match self.download(url, dest, expected_sha256) {
            Ok(digest) => Ok(digest),
            Err(e) if is_status_error(&e) => {
                warn!("mirror miss for {} ({:#}), falling back to {}", url, e, fallback_url);
                self.download(fallback_url, dest, expected_sha256)
            }
            Err(e) => Err(e),
        }
    }

    fn download(&self, url: &str, dest: &Path, expected_sha256: &str) -> Result<String> {
        let filename = dest
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("downloading {} from {}", filename, url);

        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("requesting {url}"))?;
        let total: Option<u64> = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let mut reader = response.into_body().into_reader();
        let (actual, downloaded) =
            write_verified(&mut reader, dest, expected_sha256, total, &filename)?;
        info!("downloaded {} ({} bytes)", filename, downloaded);
        Ok(actual)
    }
}

/// Streams `reader` into `<dest>.part`, checks the digest and renames the
/// file into place. The temp file never outlives a failure.
fn write_verified(
    reader: &mut impl Read,
    dest: &Path,
    expected_sha256: &str,
    total: Option<u64>,
    filename: &str,
) -> Result<(String, u64)> {
    let tmp = dest.with_extension("part");
    let result = stream_to(reader, &tmp, total, filename).and_then(|(actual, downloaded)| {
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            bail!(
                "SHA256 mismatch for {}: expected {}, got {}",
                filename,
                expected_sha256,
                actual
            );
        }
        std::fs::rename(&tmp, dest)
            .with_context(|| format!("moving {} into place", tmp.display()))?;
        Ok((actual, downloaded))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn stream_to(
    reader: &mut impl Read,
    tmp: &Path,
    total: Option<u64>,
    filename: &str,
) -> Result<(String, u64)> {
    let mut file =
        std::fs::File::create(tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    let mut last_report = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading {filename}"))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("writing {}", tmp.display()))?;
        hasher.update(&buf[..n]);
        downloaded += n as u64;

        if downloaded - last_report > 50_000_000 {
            match total {
                Some(total) => debug!(
                    "{}: {}/{}MB",
                    filename,
                    downloaded / 1_000_000,
                    total / 1_000_000
                ),
                None => debug!("{}: {}MB", filename, downloaded / 1_000_000),
            }
            last_report = downloaded;
        }
    }
    file.flush()?;
    Ok((format!("{:x}", hasher.finalize()), downloaded))
}

fn marker_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".sha256");
    dest.with_file_name(name)
}

/// Digest recorded for a complete download, if the cache holds one that
/// agrees with the pinned digest.
fn cached_digest(dest: &Path, pinned: &str) -> Option<String> {
    if !dest.exists() {
        return None;
    }
    let recorded = std::fs::read_to_string(marker_path(dest)).ok()?;
    let recorded = recorded.trim();
    if recorded.is_empty() {
        return None;
    }
    recorded
        .eq_ignore_ascii_case(pinned)
        .then(|| recorded.to_string())
}

fn is_status_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ureq::Error>(),
        Some(ureq::Error::StatusCode(_))
    )
}
