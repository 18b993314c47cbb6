//! 成果物のダウンロード・保存
//!
//! バックエンドが生成した画像・CSV・ZIP・レポートを取得してローカルに保存する。
//! 空の選択（検出なし・結果なし）はリクエスト前にエラーとする。

use crate::client::{CsvRow, InspectionBackend};
use crate::error::{InspectError, Result};
use base64::Engine;
use lazy_static::lazy_static;
use pcb_inspect_common::{InspectionResult, ResultViewState};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const COMBINED_CSV_NAME: &str = "pcb_defects_combined_report.csv";
pub const ZIP_NAME: &str = "all_annotated_images.zip";

lazy_static! {
    static ref EXTENSION_RE: Regex = Regex::new(r"\.[^/.]+$").unwrap();
    static ref UNSAFE_CHARS_RE: Regex = Regex::new(r#"[/\\:*?"<>|]"#).unwrap();
}

/// 保存する画像の種類
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageKind {
    Original,
    #[default]
    Annotated,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Original => "original",
            ImageKind::Annotated => "annotated",
        }
    }
}

impl std::str::FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" | "orig" | "o" => Ok(ImageKind::Original),
            "annotated" | "annot" | "a" => Ok(ImageKind::Annotated),
            _ => Err(format!("Unknown image kind: {}. Use original or annotated", s)),
        }
    }
}

/// ファイル名に使えない文字を置換
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = UNSAFE_CHARS_RE.replace_all(name.trim(), "_").to_string();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

/// `detections_<拡張子なしの名前>.csv`
pub fn item_csv_name(identifier: &str) -> String {
    let stem = EXTENSION_RE.replace(identifier, "");
    sanitize_file_name(&format!("detections_{}.csv", stem))
}

pub fn csv_rows(result: &InspectionResult) -> Vec<CsvRow> {
    if result.is_failed() {
        return Vec::new();
    }
    result
        .defects
        .iter()
        .map(|d| CsvRow {
            image: result.identifier.clone(),
            defect_type: d.label.clone(),
            x1: d.bbox.x1,
            y1: d.bbox.y1,
            x2: d.bbox.x2,
            y2: d.bbox.y2,
            confidence: d.confidence,
        })
        .collect()
}

pub fn combined_csv_rows(results: &[InspectionResult]) -> Vec<CsvRow> {
    results.iter().flat_map(csv_rows).collect()
}

/// ディレクトリに保存して保存先パスを返す
pub fn save_blob(output_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(sanitize_file_name(file_name));
    std::fs::write(&path, bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "saved");
    Ok(path)
}

/// 画像を保存（インラインの注釈画像があればネットワークを使わずにデコード）
pub async fn download_image<B: InspectionBackend + ?Sized>(
    backend: &B,
    result: &InspectionResult,
    kind: ImageKind,
    output_dir: &Path,
) -> Result<PathBuf> {
    if result.is_failed() {
        return Err(InspectError::Download(format!(
            "{} は処理に失敗しているため画像がありません",
            result.identifier
        )));
    }

    let file_name = format!("{}_{}", kind.as_str(), result.identifier);

    if kind == ImageKind::Annotated {
        if let Some(data) = result.annotated_image.as_deref() {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(strip_data_url(data))
                .map_err(|e| InspectError::Download(format!("画像データのデコードに失敗: {}", e)))?;
            return save_blob(output_dir, &file_name, &bytes);
        }
    }

    let reference = match kind {
        ImageKind::Original => result.image_paths.original.as_deref(),
        ImageKind::Annotated => result.image_paths.annotated.as_deref(),
    }
    .ok_or_else(|| {
        InspectError::Download(format!("{} の{}画像がありません", result.identifier, kind.as_str()))
    })?;

    let bytes = backend.fetch_blob(reference).await.map_err(download_error)?;
    save_blob(output_dir, &file_name, &bytes)
}

/// 1件分の検出結果CSV
pub async fn download_item_csv<B: InspectionBackend + ?Sized>(
    backend: &B,
    result: &InspectionResult,
    output_dir: &Path,
) -> Result<PathBuf> {
    let rows = csv_rows(result);
    if rows.is_empty() {
        return Err(InspectError::Download(format!("{} には検出結果がありません", result.identifier)));
    }
    let file_name = item_csv_name(&result.identifier);
    let bytes = backend.render_csv(&rows, &file_name).await.map_err(download_error)?;
    save_blob(output_dir, &file_name, &bytes)
}

/// 全件をまとめた検出結果CSV
pub async fn download_combined_csv<B: InspectionBackend + ?Sized>(
    backend: &B,
    results: &[InspectionResult],
    output_dir: &Path,
) -> Result<PathBuf> {
    let rows = combined_csv_rows(results);
    if rows.is_empty() {
        return Err(InspectError::Download("ダウンロードできる検出結果がありません".into()));
    }
    let bytes = backend.render_csv(&rows, COMBINED_CSV_NAME).await.map_err(download_error)?;
    save_blob(output_dir, COMBINED_CSV_NAME, &bytes)
}

/// 注釈付き画像のZIP
pub async fn download_zip<B: InspectionBackend + ?Sized>(
    backend: &B,
    results: &[InspectionResult],
    output_dir: &Path,
) -> Result<PathBuf> {
    let ok: Vec<InspectionResult> = results.iter().filter(|r| !r.is_failed()).cloned().collect();
    if ok.is_empty() {
        return Err(InspectError::Download("ダウンロードできる画像がありません".into()));
    }
    let bytes = backend.render_zip(&ok).await.map_err(download_error)?;
    if bytes.is_empty() {
        return Err(InspectError::Download("ZIPファイルが空です".into()));
    }
    save_blob(output_dir, ZIP_NAME, &bytes)
}

/// バックエンドが生成したレポートファイル
pub async fn download_report<B: InspectionBackend + ?Sized>(
    backend: &B,
    result: &InspectionResult,
    output_dir: &Path,
) -> Result<PathBuf> {
    let reference = result
        .image_paths
        .report
        .as_deref()
        .ok_or_else(|| InspectError::Download(format!("{} にはレポートがありません", result.identifier)))?;
    let file_name = reference
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("report_{}", result.identifier));
    let bytes = backend.fetch_blob(reference).await.map_err(download_error)?;
    save_blob(output_dir, &file_name, &bytes)
}

/// セッションの結果をJSONとして書き出す
pub fn export_json(state: &ResultViewState, output: &Path) -> Result<PathBuf> {
    let path = if output.is_dir() || output.extension().is_none() {
        output.join("inspection_results.json")
    } else {
        output.to_path_buf()
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(state.results())?;
    std::fs::write(&path, json)?;
    Ok(path)
}

fn strip_data_url(data: &str) -> &str {
    match data.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => data,
    }
}

fn download_error(err: crate::client::BackendError) -> InspectError {
    InspectError::Download(err.to_string())
}
