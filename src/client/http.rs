//! reqwest によるバックエンド実装

use super::{BackendError, CsvRow, HealthStatus, InferenceParams, InspectionBackend};
use crate::config::Config;
use crate::error::{InspectError, Result};
use crate::scanner::UploadFile;
use async_trait::async_trait;
use pcb_inspect_common::parser::{extract_error_message, parse_batch_response, parse_item_response, ItemResponse};
use pcb_inspect_common::InspectionResult;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

const HEALTH_PATH: &str = "/health";
const BATCH_PATH: &str = "/inspection/predict";
const PROGRESSIVE_PATH: &str = "/detect-progressive";
const CSV_PATH: &str = "/download/csv";
const ZIP_PATH: &str = "/download/zip";
const CLEAR_PATH: &str = "/api/clear";

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InspectError::Config(format!("HTTPクライアント初期化エラー: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.backend_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 相対パスをバックエンドのURLに解決（絶対URLはそのまま）
    pub fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            format!("{}/{}", self.base_url, reference.trim_start_matches('/'))
        }
    }

    async fn file_part(file: &UploadFile) -> std::result::Result<Part, BackendError> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| BackendError::Item(format!("{} を読み込めません: {}", file.file_name, e)))?;
        Part::bytes(bytes)
            .file_name(file.file_name.clone())
            .mime_str(file.mime)
            .map_err(|e| BackendError::Item(e.to_string()))
    }

    async fn blob_or_error(response: Response) -> std::result::Result<Vec<u8>, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Request(
                extract_error_message(&body).unwrap_or_else(|| format!("Server returned {}", status)),
            ));
        }
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

fn request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Request(format!("タイムアウトしました: {}", err))
    } else {
        BackendError::Request(err.to_string())
    }
}

/// 1ファイル処理でのエラー分類
///
/// タイムアウトは項目単位の失敗、接続できない場合はリクエスト全体の失敗とする。
fn item_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Item("タイムアウトしました".into())
    } else if err.is_connect() {
        BackendError::Request(format!("バックエンドに接続できません: {}", err))
    } else if err.is_body() || err.is_decode() {
        BackendError::Item(err.to_string())
    } else {
        BackendError::Request(err.to_string())
    }
}

#[async_trait]
impl InspectionBackend for HttpBackend {
    async fn health(&self) -> std::result::Result<HealthStatus, BackendError> {
        let response = self
            .client
            .get(self.resolve(HEALTH_PATH))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(BackendError::Request(format!("Server returned {}", response.status())));
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn predict_batch(
        &self,
        files: &[UploadFile],
        params: &InferenceParams,
    ) -> std::result::Result<Vec<InspectionResult>, BackendError> {
        let mut form = Form::new();
        for file in files {
            let part = Self::file_part(file)
                .await
                .map_err(|e| BackendError::Request(e.to_string()))?;
            form = form.part("files[]", part);
        }
        form = form
            .text("conf_threshold", params.conf_threshold.to_string())
            .text("iou_threshold", params.iou_threshold.to_string());

        debug!(files = files.len(), "batch upload");

        let response = self
            .client
            .post(self.resolve(BATCH_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(BackendError::Request(
                extract_error_message(&body).unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        format!("Server returned {}", status)
                    } else {
                        body.trim().to_string()
                    }
                }),
            ));
        }

        parse_batch_response(&body).map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn detect_single(&self, file: &UploadFile) -> std::result::Result<InspectionResult, BackendError> {
        let form = Form::new().part("file", Self::file_part(file).await?);

        debug!(file = %file.file_name, "progressive upload");

        let response = self
            .client
            .post(self.resolve(PROGRESSIVE_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(item_error)?;

        let status = response.status();
        let body = response.text().await.map_err(item_error)?;

        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| format!("Server returned {}", status.as_u16()));
            warn!(file = %file.file_name, %message, "detection failed");
            return Err(BackendError::Item(message));
        }

        match parse_item_response(&body, &file.file_name) {
            Ok(ItemResponse::Result(result)) => Ok(result),
            Ok(ItemResponse::Error(message)) => Err(BackendError::Item(message)),
            Err(e) => Err(BackendError::Item(format!("レスポンス解析エラー: {}", e))),
        }
    }

    async fn fetch_blob(&self, reference: &str) -> std::result::Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .get(self.resolve(reference))
            .send()
            .await
            .map_err(request_error)?;
        Self::blob_or_error(response).await
    }

    async fn render_csv(&self, rows: &[CsvRow], filename: &str) -> std::result::Result<Vec<u8>, BackendError> {
        let body = serde_json::json!({
            "detections": rows,
            "filename": filename,
        });
        let response = self
            .client
            .post(self.resolve(CSV_PATH))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        Self::blob_or_error(response).await
    }

    async fn render_zip(&self, results: &[InspectionResult]) -> std::result::Result<Vec<u8>, BackendError> {
        let body = serde_json::json!({ "results": results });
        let response = self
            .client
            .post(self.resolve(ZIP_PATH))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        Self::blob_or_error(response).await
    }

    async fn clear_session(&self) -> std::result::Result<(), BackendError> {
        let response = self
            .client
            .post(self.resolve(CLEAR_PATH))
            .send()
            .await
            .map_err(request_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Request(format!("Server returned {}", response.status())))
        }
    }
}
