//! セッション永続化
//!
//! 現在のセッションの結果・選択位置・表示モードをJSONファイルに保存する。
//! `inspect` は既定で新しいセッションを開始する（再読み込み時のクリアに相当）。

pub mod cache;

pub use cache::{compute_file_hash, ResultCache};

use crate::error::Result;
use chrono::{DateTime, Utc};
use pcb_inspect_common::{InspectionResult, ResultViewState, ViewMode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::warn;

const SESSION_FILE_NAME: &str = ".pcb-inspect-session.json";

/// セッションファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    /// バージョン（互換性チェック用）
    version: u32,
    saved_at: DateTime<Utc>,
    results: Vec<InspectionResult>,
    selected_index: Option<usize>,
    view_mode: ViewMode,
}

/// 保存済みセッションの概要
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub path: PathBuf,
    pub saved_at: DateTime<Utc>,
    pub result_count: usize,
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    const CURRENT_VERSION: u32 = 1;

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE_NAME)
    }

    /// セッションを読み込み（存在しない・壊れている場合は空の状態）
    pub fn load(&self) -> ResultViewState {
        match self.read_file() {
            Some(file) => ResultViewState::restore(file.results, file.selected_index, file.view_mode),
            None => ResultViewState::new(),
        }
    }

    pub fn save(&self, state: &ResultViewState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let file = SessionFile {
            version: Self::CURRENT_VERSION,
            saved_at: Utc::now(),
            results: state.results().to_vec(),
            selected_index: state.selected_index(),
            view_mode: state.view_mode(),
        };
        let writer = BufWriter::new(File::create(self.path())?);
        serde_json::to_writer_pretty(writer, &file)?;
        Ok(())
    }

    /// セッションファイルを削除（存在しなければ false）
    pub fn clear(&self) -> Result<bool> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.read_file().map(|file| SessionInfo {
            path: self.path(),
            saved_at: file.saved_at,
            result_count: file.results.len(),
        })
    }

    fn read_file(&self) -> Option<SessionFile> {
        let path = self.path();
        if !path.exists() {
            return None;
        }
        let reader = BufReader::new(File::open(&path).ok()?);
        match serde_json::from_reader::<_, SessionFile>(reader) {
            Ok(file) if file.version == Self::CURRENT_VERSION => Some(file),
            Ok(file) => {
                warn!(version = file.version, "session version mismatch, starting fresh");
                None
            }
            Err(e) => {
                warn!(error = %e, "session file is corrupt, starting fresh");
                None
            }
        }
    }
}
