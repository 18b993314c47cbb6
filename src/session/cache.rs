//! 検査結果キャッシュモジュール
//!
//! 画像のSHA-256ハッシュをキーにして検査結果をキャッシュし、
//! 同じ画像の再アップロードをスキップする。

use crate::error::Result;
use pcb_inspect_common::InspectionResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;
use tracing::warn;

const CACHE_FILE_NAME: &str = ".pcb-inspect-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// ファイルハッシュ → 検査結果のマップ
    entries: HashMap<String, CacheEntry>,
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_name: String,
    pub result: InspectionResult,
}

impl ResultCache {
    const CURRENT_VERSION: u32 = 1;

    pub fn cache_path(dir: &Path) -> std::path::PathBuf {
        dir.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み
    pub fn load(dir: &Path) -> Self {
        let cache_path = Self::cache_path(dir);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        match serde_json::from_reader::<_, ResultCache>(BufReader::new(file)) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(_) => {
                warn!("cache version mismatch, rebuilding");
                Self::default()
            }
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let writer = BufWriter::new(File::create(Self::cache_path(dir))?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュファイルを削除
    pub fn clear(dir: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(dir);
        if cache_path.exists() {
            std::fs::remove_file(cache_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get(&self, hash: &str) -> Option<&InspectionResult> {
        self.entries.get(hash).map(|e| &e.result)
    }

    /// キャッシュに追加（失敗エントリは保存しない）
    pub fn insert(&mut self, hash: String, file_name: String, result: InspectionResult) {
        if result.is_failed() {
            return;
        }
        self.entries.insert(hash, CacheEntry { file_name, result });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// 画像ファイルのハッシュを計算（SHA-256, hex）
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_content_based() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let c = dir.path().join("c.jpg");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        std::fs::write(&c, b"other bytes").unwrap();

        let ha = compute_file_hash(&a).unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, compute_file_hash(&b).unwrap());
        assert_ne!(ha, compute_file_hash(&c).unwrap());
    }

    #[test]
    fn test_failed_results_are_not_cached() {
        let mut cache = ResultCache::default();
        cache.insert("h1".into(), "x.jpg".into(), InspectionResult::failed("x.jpg", "timeout"));
        assert!(cache.is_empty());
    }
}
