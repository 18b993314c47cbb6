//! テキスト描画
//!
//! `ResultViewState` を文字列に射影する純粋関数群。状態は変更しない。

use crate::summary::Summary;
use crate::types::{InspectionResult, Status};
use crate::view_state::{ResultViewState, ViewMode};
use std::collections::BTreeMap;
use std::fmt::Write;

/// グリッド表示のカード幅（文字数）
pub const GRID_CARD_WIDTH: usize = 24;

const HISTOGRAM_BAR_WIDTH: usize = 30;

/// 現在の表示モードで描画
pub fn render(state: &ResultViewState, grid_columns: usize) -> String {
    match state.view_mode() {
        ViewMode::Expanded => render_expanded(state),
        ViewMode::Grid => render_grid(state, grid_columns),
    }
}

pub fn status_label(result: &InspectionResult) -> &'static str {
    match result.status {
        Status::Pass => "✔ PASS",
        Status::Defect => "✖ DEFECT",
        Status::NotApplicable => "- NOT PCB",
        Status::Failed => "⚠ FAILED",
    }
}

pub fn format_confidence(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

/// 選択中の1件を詳細表示
pub fn render_expanded(state: &ResultViewState) -> String {
    let (Some(index), Some(result)) = (state.selected_index(), state.selected()) else {
        return "結果はまだありません\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "[{} / {}] {}", index + 1, state.len(), result.identifier);
    let _ = writeln!(out, "{}", "-".repeat(48));
    out.push_str(&render_card_body(result));
    out
}

/// 1件分の詳細（ヘッダーなし）
pub fn render_card_body(result: &InspectionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ステータス : {}", status_label(result));

    if let Some(message) = result.error.as_deref().filter(|_| result.is_failed()) {
        let _ = writeln!(out, "エラー     : {}", message);
        return out;
    }

    let _ = writeln!(out, "信頼度     : {}", format_confidence(result.applicable_confidence()));
    if let Some(ms) = result.inference_ms {
        let _ = writeln!(out, "推論時間   : {:.0} ms", ms);
    }
    if let Some(path) = result.image_paths.original.as_deref() {
        let _ = writeln!(out, "元画像     : {}", path);
    }
    if let Some(path) = result.image_paths.annotated.as_deref() {
        let _ = writeln!(out, "注釈画像   : {}", path);
    } else if result.annotated_image.is_some() {
        let _ = writeln!(out, "注釈画像   : (inline)");
    }
    if let Some(path) = result.image_paths.report.as_deref() {
        let _ = writeln!(out, "レポート   : {}", path);
    }

    if result.defects.is_empty() {
        if result.status != Status::NotApplicable {
            let _ = writeln!(out, "欠陥は検出されませんでした");
        }
        return out;
    }

    let _ = writeln!(out, "欠陥 {}件:", result.defects.len());
    let _ = writeln!(out, "  {:>3}  {:<18} {:>6}  BBox", "#", "Label", "Conf");
    for (i, defect) in result.defects.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>3}  {:<18} {:>5.1}%  {}",
            i + 1,
            truncate(&defect.label, 18),
            defect.confidence * 100.0,
            defect.bbox
        );
    }
    out
}

/// 全件をカード形式で一覧表示
pub fn render_grid(state: &ResultViewState, columns: usize) -> String {
    if state.is_empty() {
        return "結果はまだありません\n".to_string();
    }

    let columns = columns.max(1);
    let cards: Vec<[String; 3]> = state
        .results()
        .iter()
        .enumerate()
        .map(|(i, r)| grid_card(i, r, state.selected_index() == Some(i)))
        .collect();

    let mut out = String::new();
    for row in cards.chunks(columns) {
        for line in 0..3 {
            let cells: Vec<String> = row.iter().map(|card| pad(&card[line], GRID_CARD_WIDTH)).collect();
            let _ = writeln!(out, "{}", cells.join(" | ").trim_end());
        }
        out.push('\n');
    }
    out
}

fn grid_card(index: usize, result: &InspectionResult, selected: bool) -> [String; 3] {
    let marker = if selected { '>' } else { ' ' };
    let title = format!("{}{:>2}. {}", marker, index + 1, result.identifier);
    let detail = match result.status {
        Status::Failed => format!(
            "   {}",
            truncate(result.error.as_deref().unwrap_or("error"), GRID_CARD_WIDTH - 3)
        ),
        Status::NotApplicable => "   -".to_string(),
        _ => format!(
            "   {} defects / {}",
            result.defect_count(),
            format_confidence(result.applicable_confidence())
        ),
    };
    [
        truncate(&title, GRID_CARD_WIDTH),
        format!("   {}", status_label(result)),
        truncate(&detail, GRID_CARD_WIDTH),
    ]
}

/// 絞り込み結果の一覧（「N件 / 全M件」と1行ずつの概要）
pub fn render_filtered(state: &ResultViewState, indices: &[usize]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}件 / 全{}件を表示", indices.len(), state.len());

    for &i in indices {
        let Some(result) = state.get(i) else { continue };
        let marker = if state.selected_index() == Some(i) { '>' } else { ' ' };
        let detail = match result.status {
            Status::Failed => result.error.clone().unwrap_or_default(),
            _ => format!(
                "欠陥 {}件 / 信頼度 {}",
                result.defect_count(),
                format_confidence(result.applicable_confidence())
            ),
        };
        let _ = writeln!(
            out,
            "{}{:>3}. {}  {}  {}",
            marker,
            i + 1,
            pad(&truncate(&result.identifier, 28), 28),
            status_label(result),
            detail
        );
    }
    out
}

/// 集計ブロック
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "処理画像数     : {}", summary.total_count);
    let _ = writeln!(out, "欠陥のある画像 : {}", summary.defective_images);
    let _ = writeln!(out, "欠陥総数       : {}", summary.defect_instances);
    let _ = writeln!(out, "合格           : {}", summary.pass_count);
    let _ = writeln!(out, "PCB以外        : {}", summary.not_applicable_count);
    let _ = writeln!(out, "処理失敗       : {}", summary.failed_count);
    let _ = writeln!(out, "平均信頼度     : {}", format_confidence(summary.average_confidence));
    out
}

/// 欠陥種別ヒストグラム（横棒グラフ）
pub fn render_histogram(histogram: &BTreeMap<String, usize>) -> String {
    if histogram.is_empty() {
        return "欠陥は検出されていません\n".to_string();
    }

    let max = histogram.values().copied().max().unwrap_or(1).max(1);
    let label_width = histogram.keys().map(|k| k.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for (label, &count) in histogram {
        let bar_len = (count * HISTOGRAM_BAR_WIDTH).div_ceil(max);
        let _ = writeln!(
            out,
            "{} | {} {}",
            pad(label, label_width),
            "█".repeat(bar_len),
            count
        );
    }
    out
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", kept)
}

fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - len))
    }
}
