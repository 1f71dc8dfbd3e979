// Remote dataset download with checksum verification and a local cache
use anyhow::{anyhow, Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct DatasetFetcher {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

/// Hex-encoded SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

impl DatasetFetcher {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            client: reqwest::Client::new(),
        })
    }

    /// Local path the dataset at `url` is cached under
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.json", &sha256_hex(url.as_bytes())[..16]));
        self.cache_dir.join(name)
    }

    /// Download `url` into the cache, reusing a cached copy whose checksum matches
    pub async fn fetch(&self, url: &str, expected_checksum: Option<&str>) -> Result<PathBuf> {
        let path = self.cache_path(url);

        if path.exists() {
            match expected_checksum {
                Some(expected) => {
                    let actual = sha256_hex(&fs::read(&path)?);
                    if actual.eq_ignore_ascii_case(expected) {
                        debug!(path = %path.display(), "dataset cache hit");
                        return Ok(path);
                    }
                    info!(path = %path.display(), "cached dataset checksum changed, downloading again");
                }
                None => {
                    debug!(path = %path.display(), "dataset cache hit (unverified)");
                    return Ok(path);
                }
            }
        }

        info!(url, "downloading dataset");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to download dataset: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to download dataset: HTTP {}", response.status()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow!("Failed to read dataset data: {}", e))?;

        if let Some(expected) = expected_checksum {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(anyhow!("Checksum mismatch: expected {}, got {}", expected, actual));
            }
        }

        write_atomic(&path, &bytes)?;
        info!(path = %path.display(), size = bytes.len(), "dataset cached");
        Ok(path)
    }
}

/// Replace `path` with `data` in one rename
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(data))
        .with_context(|| format!("failed to write {}", path.display()))
}
