//! Versioned on-disk artifact store
//!
//! Layout:
//! ```text
//! <root>/<key>/v0001/manifest.json
//! <root>/<key>/v0001/scaler.json
//! <root>/<key>/v0001/model.safetensors
//! <root>/<key>/CURRENT
//! ```
//!
//! A version is written into a hidden temporary directory and renamed into
//! place, then `CURRENT` is replaced the same way, so readers only ever see
//! complete versions.

use super::{ArtifactManifest, TrainedArtifact};
use crate::error::{ForecastError, Result};
use crate::ml::{Forecaster, MinMaxScaler};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";
const SCALER_FILE: &str = "scaler.json";
const MODEL_FILE: &str = "model.safetensors";
const CURRENT_FILE: &str = "CURRENT";

/// Reject keys that could escape the store root
pub fn validate_key(key: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '^' | '=' | '-');
    if key.is_empty() || key.starts_with('.') || !key.chars().all(allowed) {
        return Err(ForecastError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) fn version_dir_name(version: u32) -> String {
    format!("v{:04}", version)
}

fn parse_version(name: &str) -> Option<u32> {
    name.strip_prefix('v')
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn verify_checksum(path: &Path, bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(ForecastError::ArtifactCorrupted(format!(
            "checksum mismatch for {}",
            path.display()
        )));
    }
    Ok(())
}

/// Write `contents` next to `path` and rename over it
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        fs::remove_file(&tmp).ok();
        return Err(e.into());
    }
    Ok(())
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Keys that have a current version
    pub fn keys(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_key(&name).is_ok() && entry.path().join(CURRENT_FILE).is_file() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Saved versions of `key`, ascending
    pub fn versions(&self, key: &str) -> Result<Vec<u32>> {
        let dir = self.key_dir(key)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(v) = parse_version(&entry.file_name().to_string_lossy()) {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Version named by `CURRENT`, if any
    pub fn current_version(&self, key: &str) -> Result<Option<u32>> {
        let path = self.key_dir(key)?.join(CURRENT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let label = fs::read_to_string(&path)?;
        parse_version(label.trim())
            .map(Some)
            .ok_or_else(|| ForecastError::ArtifactCorrupted(format!("bad CURRENT file for '{}'", key)))
    }

    /// Persist a trained artifact as the next version of its key
    ///
    /// Returns the artifact with its version and checksums filled in.
    pub fn save(&self, mut artifact: TrainedArtifact) -> Result<TrainedArtifact> {
        let key = artifact.manifest.key.clone();
        let key_dir = self.key_dir(&key)?;
        fs::create_dir_all(&key_dir)?;

        let version = self.versions(&key)?.last().copied().unwrap_or(0) + 1;
        let staging = key_dir.join(format!(".staging-{}", Uuid::new_v4().simple()));
        fs::create_dir(&staging)?;

        let written = self.write_version(&staging, &mut artifact, version);
        let final_dir = key_dir.join(version_dir_name(version));
        let renamed = written.and_then(|_| fs::rename(&staging, &final_dir).map_err(Into::into));
        if let Err(e) = renamed {
            fs::remove_dir_all(&staging).ok();
            return Err(e);
        }

        write_atomic(
            &key_dir.join(CURRENT_FILE),
            version_dir_name(version).as_bytes(),
        )?;

        info!(
            "Saved artifact {} {} (run {})",
            key,
            version_dir_name(version),
            artifact.manifest.run_id
        );
        Ok(artifact)
    }

    fn write_version(&self, dir: &Path, artifact: &mut TrainedArtifact, version: u32) -> Result<()> {
        let scaler_json = artifact.scaler.to_json()?;
        fs::write(dir.join(SCALER_FILE), &scaler_json)?;

        let model_path = dir.join(MODEL_FILE);
        artifact.forecaster.save(&model_path)?;
        let model_bytes = fs::read(&model_path)?;

        let manifest = &mut artifact.manifest;
        manifest.version = version;
        manifest.scaler_sha256 = sha256_hex(scaler_json.as_bytes());
        manifest.model_sha256 = sha256_hex(&model_bytes);

        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(manifest)?)?;
        Ok(())
    }

    /// Load whatever `CURRENT` points at
    pub fn load_latest(&self, key: &str) -> Result<TrainedArtifact> {
        match self.current_version(key)? {
            Some(version) => self.load_version(key, version),
            None => Err(ForecastError::ModelNotTrained(key.to_string())),
        }
    }

    pub fn load_version(&self, key: &str, version: u32) -> Result<TrainedArtifact> {
        let dir = self.key_dir(key)?.join(version_dir_name(version));
        if !dir.is_dir() {
            return Err(ForecastError::ModelNotTrained(format!(
                "{} {}",
                key,
                version_dir_name(version)
            )));
        }

        let manifest = self.read_manifest(&dir)?;
        if manifest.key != key || manifest.version != version {
            return Err(ForecastError::ArtifactCorrupted(format!(
                "manifest in {} names {} {}",
                dir.display(),
                manifest.key,
                manifest.version_label()
            )));
        }

        let scaler_path = dir.join(SCALER_FILE);
        let scaler_bytes = fs::read(&scaler_path)?;
        verify_checksum(&scaler_path, &scaler_bytes, &manifest.scaler_sha256)?;
        let scaler_json = String::from_utf8(scaler_bytes)
            .map_err(|e| ForecastError::ArtifactCorrupted(format!("{}: {}", scaler_path.display(), e)))?;
        let scaler = MinMaxScaler::from_json(&scaler_json)?;
        scaler.ensure_columns(&manifest.columns)?;

        let model_path = dir.join(MODEL_FILE);
        verify_checksum(&model_path, &fs::read(&model_path)?, &manifest.model_sha256)?;
        let forecaster = Forecaster::load(manifest.forecaster.clone(), &model_path)?;

        debug!("Loaded artifact {} {}", key, version_dir_name(version));
        Ok(TrainedArtifact {
            manifest,
            scaler,
            forecaster,
        })
    }

    /// Manifests of every saved version, oldest first
    pub fn manifests(&self, key: &str) -> Result<Vec<ArtifactManifest>> {
        let dir = self.key_dir(key)?;
        self.versions(key)?
            .into_iter()
            .map(|v| self.read_manifest(&dir.join(version_dir_name(v))))
            .collect()
    }

    fn read_manifest(&self, dir: &Path) -> Result<ArtifactManifest> {
        let path = dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&path)?;
        serde_json::from_str(&json)
            .map_err(|e| ForecastError::ArtifactCorrupted(format!("{}: {}", path.display(), e)))
    }
}
