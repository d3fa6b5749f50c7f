use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::compile::{compile, CompileOptions};
use crate::diagnostic::CompilerError;

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub code: String,
}

/// Compiled modules keyed by the SHA-256 of source and options. Entries live
/// in memory and, when a directory is configured, as JSON files on disk.
#[derive(Default)]
pub struct IncrementalCache {
    cache_dir: Option<PathBuf>,
    entries: RwLock<HashMap<String, String>>,
}

impl IncrementalCache {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist entries under `cache_dir`, creating it if needed.
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            if let Err(e) = fs::create_dir_all(&cache_dir) {
                log::warn!("[aspc] cannot create cache dir {}: {}", cache_dir.display(), e);
            }
        }
        Self {
            cache_dir: Some(cache_dir),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn compute_hash(source: &str, options: &CompileOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        if let Ok(options) = serde_json::to_vec(options) {
            hasher.update(&options);
        }
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, hash: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", hash)))
    }

    pub fn get(&self, source: &str, options: &CompileOptions) -> Option<String> {
        let hash = Self::compute_hash(source, options);
        if let Some(code) = self.entries.read().ok()?.get(&hash) {
            return Some(code.clone());
        }

        let path = self.entry_path(&hash)?;
        let data = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("[aspc] cache entry {} is corrupt: {}", path.display(), e);
                fs::remove_file(&path).ok();
                return None;
            }
        };
        if entry.hash != hash {
            return None;
        }
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(hash, entry.code.clone());
        }
        Some(entry.code)
    }

    pub fn set(&self, source: &str, options: &CompileOptions, code: &str) {
        let hash = Self::compute_hash(source, options);
        if let Some(path) = self.entry_path(&hash) {
            let entry = CacheEntry {
                hash: hash.clone(),
                code: code.to_string(),
            };
            if let Ok(data) = serde_json::to_string(&entry) {
                fs::write(path, data).ok();
            }
        }
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(hash, code.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached module or compiles and stores it. Failed
    /// compilations are not cached.
    pub fn compile_cached(
        &self,
        source: &str,
        options: &CompileOptions,
    ) -> Result<String, CompilerError> {
        if let Some(code) = self.get(source, options) {
            log::debug!("[aspc] cache hit for {}", options.file_name());
            return Ok(code);
        }
        let code = compile(source, options)?;
        self.set(source, options, &code);
        Ok(code)
    }
}
