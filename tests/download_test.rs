//! ダウンロードテスト
//!
//! 保存ファイル名・インライン画像のデコード・失敗エントリの除外を検証

use async_trait::async_trait;
use base64::Engine;
use pcb_inspect::client::{BackendError, CsvRow, HealthStatus, InferenceParams, InspectionBackend};
use pcb_inspect::error::InspectError;
use pcb_inspect::export::{self, ImageKind};
use pcb_inspect::scanner::UploadFile;
use pcb_inspect_common::{BoundingBox, Defect, ImagePaths, InspectionResult, Status};
use std::sync::Mutex;
use tempfile::tempdir;

/// 呼び出し内容を記録する偽のバックエンド
#[derive(Default)]
struct RecordingBackend {
    fetched: Mutex<Vec<String>>,
    csv_requests: Mutex<Vec<(usize, String)>>,
    zip_requests: Mutex<Vec<usize>>,
    empty_zip: bool,
}

#[async_trait]
impl InspectionBackend for RecordingBackend {
    async fn health(&self) -> Result<HealthStatus, BackendError> {
        Ok(HealthStatus::default())
    }

    async fn predict_batch(
        &self,
        _files: &[UploadFile],
        _params: &InferenceParams,
    ) -> Result<Vec<InspectionResult>, BackendError> {
        Ok(Vec::new())
    }

    async fn detect_single(&self, file: &UploadFile) -> Result<InspectionResult, BackendError> {
        Ok(InspectionResult { identifier: file.file_name.clone(), ..Default::default() })
    }

    async fn fetch_blob(&self, reference: &str) -> Result<Vec<u8>, BackendError> {
        self.fetched.lock().unwrap().push(reference.to_string());
        Ok(format!("blob:{}", reference).into_bytes())
    }

    async fn render_csv(&self, rows: &[CsvRow], filename: &str) -> Result<Vec<u8>, BackendError> {
        self.csv_requests.lock().unwrap().push((rows.len(), filename.to_string()));
        Ok(b"Image,Defect Type\n".to_vec())
    }

    async fn render_zip(&self, results: &[InspectionResult]) -> Result<Vec<u8>, BackendError> {
        self.zip_requests.lock().unwrap().push(results.len());
        if self.empty_zip {
            Ok(Vec::new())
        } else {
            Ok(b"PK\x03\x04".to_vec())
        }
    }

    async fn clear_session(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

fn defective(name: &str, labels: &[&str]) -> InspectionResult {
    InspectionResult {
        identifier: name.to_string(),
        status: Status::Defect,
        confidence_score: Some(0.9),
        defects: labels
            .iter()
            .map(|label| Defect {
                label: label.to_string(),
                confidence: 0.7,
                bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            })
            .collect(),
        image_paths: ImagePaths {
            original: Some(format!("/uploads/{}", name)),
            annotated: Some(format!("/results/annotated_{}", name)),
            report: Some(format!("/reports/{}.pdf", name)),
        },
        ..Default::default()
    }
}

/// インラインの注釈画像はバックエンドを呼ばずにデコードして保存
#[tokio::test]
async fn test_download_inline_annotated_image() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"PNGBYTES");
    let result = InspectionResult {
        annotated_image: Some(format!("data:image/png;base64,{}", encoded)),
        ..defective("board.png", &["Short"])
    };

    let path = export::download_image(&backend, &result, ImageKind::Annotated, dir.path())
        .await
        .expect("ダウンロード失敗");

    assert_eq!(path.file_name().unwrap(), "annotated_board.png");
    assert_eq!(std::fs::read(&path).unwrap(), b"PNGBYTES");
    assert!(backend.fetched.lock().unwrap().is_empty());
}

/// インライン画像がなければパスから取得
#[tokio::test]
async fn test_download_original_image_fetches_path() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let result = defective("board.png", &[]);

    let path = export::download_image(&backend, &result, ImageKind::Original, dir.path())
        .await
        .expect("ダウンロード失敗");

    assert_eq!(path.file_name().unwrap(), "original_board.png");
    assert_eq!(*backend.fetched.lock().unwrap(), vec!["/uploads/board.png".to_string()]);
}

/// 失敗エントリの画像は取得できない
#[tokio::test]
async fn test_download_image_of_failed_entry() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let result = InspectionResult::failed("broken.png", "タイムアウトしました");

    let err = export::download_image(&backend, &result, ImageKind::Annotated, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, InspectError::Download(_)));
}

#[tokio::test]
async fn test_download_item_csv_name() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let result = defective("board_01.jpg", &["Short", "Spur"]);

    let path = export::download_item_csv(&backend, &result, dir.path())
        .await
        .expect("ダウンロード失敗");

    assert_eq!(path.file_name().unwrap(), "detections_board_01.csv");
    assert_eq!(
        *backend.csv_requests.lock().unwrap(),
        vec![(2, "detections_board_01.csv".to_string())]
    );
}

/// 欠陥のない結果はCSVを作らない
#[tokio::test]
async fn test_download_item_csv_without_defects() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let result = defective("clean.png", &[]);

    let err = export::download_item_csv(&backend, &result, dir.path()).await.unwrap_err();
    assert!(matches!(err, InspectError::Download(_)));
    assert!(backend.csv_requests.lock().unwrap().is_empty());
}

/// 全件CSVは失敗エントリを除いた全欠陥をまとめる
#[tokio::test]
async fn test_download_combined_csv() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let results = vec![
        defective("a.png", &["Short"]),
        InspectionResult::failed("b.png", "error"),
        defective("c.png", &["Spur", "Open_circuit"]),
    ];

    let path = export::download_combined_csv(&backend, &results, dir.path())
        .await
        .expect("ダウンロード失敗");

    assert_eq!(path.file_name().unwrap(), export::COMBINED_CSV_NAME);
    assert_eq!(
        *backend.csv_requests.lock().unwrap(),
        vec![(3, export::COMBINED_CSV_NAME.to_string())]
    );
}

/// ZIPは失敗エントリを除いて依頼する
#[tokio::test]
async fn test_download_zip_excludes_failed() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let results = vec![defective("a.png", &[]), InspectionResult::failed("b.png", "error")];

    let path = export::download_zip(&backend, &results, dir.path())
        .await
        .expect("ダウンロード失敗");

    assert_eq!(path.file_name().unwrap(), export::ZIP_NAME);
    assert_eq!(*backend.zip_requests.lock().unwrap(), vec![1]);
}

/// 空のZIPはエラー
#[tokio::test]
async fn test_download_empty_zip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend { empty_zip: true, ..Default::default() };
    let results = vec![defective("a.png", &[])];

    let err = export::download_zip(&backend, &results, dir.path()).await.unwrap_err();
    assert!(matches!(err, InspectError::Download(_)));
    assert!(!dir.path().join(export::ZIP_NAME).exists());
}

#[tokio::test]
async fn test_download_report_uses_remote_name() {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = RecordingBackend::default();
    let result = defective("a.png", &["Short"]);

    let path = export::download_report(&backend, &result, dir.path())
        .await
        .expect("ダウンロード失敗");

    assert_eq!(path.file_name().unwrap(), "a.png.pdf");
}
