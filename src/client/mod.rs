//! 検査バックエンド連携
//!
//! バックエンドの REST エンドポイント（アップロード・推論・ダウンロード）を
//! `InspectionBackend` トレイトとして抽象化する。

mod http;

pub use http::HttpBackend;

use crate::error::InspectError;
use crate::scanner::UploadFile;
use async_trait::async_trait;
use pcb_inspect_common::InspectionResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// バックエンド呼び出しのエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// 1ファイル分の処理失敗（縮退エントリとして記録し、処理は続行）
    #[error("{0}")]
    Item(String),

    /// リクエスト全体の失敗（処理を中断）
    #[error("{0}")]
    Request(String),

    /// レスポンス形式の不正
    #[error("{0}")]
    Parse(String),
}

impl From<BackendError> for InspectError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Item(msg) | BackendError::Request(msg) => InspectError::Request(msg),
            BackendError::Parse(msg) => InspectError::ResponseParse(msg),
        }
    }
}

/// 死活監視レスポンス
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model_loaded: Option<bool>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

/// 一括推論のパラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
}

/// CSVダウンロード用の1行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRow {
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Defect Type")]
    pub defect_type: String,
    #[serde(rename = "X1")]
    pub x1: f64,
    #[serde(rename = "Y1")]
    pub y1: f64,
    #[serde(rename = "X2")]
    pub x2: f64,
    #[serde(rename = "Y2")]
    pub y2: f64,
    #[serde(rename = "Confidence")]
    pub confidence: f64,
}

#[async_trait]
pub trait InspectionBackend: Send + Sync {
    /// `GET /health`
    async fn health(&self) -> Result<HealthStatus, BackendError>;

    /// 複数ファイルを1リクエストで推論
    async fn predict_batch(
        &self,
        files: &[UploadFile],
        params: &InferenceParams,
    ) -> Result<Vec<InspectionResult>, BackendError>;

    /// 1ファイルを推論（逐次処理用）
    async fn detect_single(&self, file: &UploadFile) -> Result<InspectionResult, BackendError>;

    /// バックエンドに保存されたファイル（画像・レポート）を取得
    async fn fetch_blob(&self, reference: &str) -> Result<Vec<u8>, BackendError>;

    /// 検出結果からCSVを生成して取得
    async fn render_csv(&self, rows: &[CsvRow], filename: &str) -> Result<Vec<u8>, BackendError>;

    /// 注釈付き画像をまとめたZIPを取得
    async fn render_zip(&self, results: &[InspectionResult]) -> Result<Vec<u8>, BackendError>;

    /// バックエンド側のセッションファイルを破棄
    async fn clear_session(&self) -> Result<(), BackendError>;
}
