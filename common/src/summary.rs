//! 集計統計
//!
//! 「欠陥のある画像の枚数」と「欠陥インスタンスの総数」は別々に数える。

use crate::types::{InspectionResult, Status};
use std::collections::BTreeMap;

/// 集計結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    /// 処理した画像の総数（失敗含む）
    pub total_count: usize,
    /// 欠陥が1件以上見つかった画像の枚数
    pub defective_images: usize,
    /// 全画像の欠陥インスタンス総数
    pub defect_instances: usize,
    pub pass_count: usize,
    pub not_applicable_count: usize,
    pub failed_count: usize,
    /// PCBと判定された画像のみの平均信頼度。対象がなければ None
    pub average_confidence: Option<f64>,
}

impl Summary {
    /// 旧画面の「Defects」欄に相当する値（欠陥のある画像の枚数）
    pub fn defect_count(&self) -> usize {
        self.defective_images
    }
}

pub fn summarize(results: &[InspectionResult]) -> Summary {
    let mut summary = Summary {
        total_count: results.len(),
        ..Default::default()
    };

    let mut confidence_sum = 0.0;
    let mut confidence_n = 0usize;

    for result in results {
        match result.status {
            Status::Pass => summary.pass_count += 1,
            Status::Defect => summary.defective_images += 1,
            Status::NotApplicable => summary.not_applicable_count += 1,
            Status::Failed => summary.failed_count += 1,
        }

        if !result.is_failed() {
            summary.defect_instances += result.defect_count();
        }

        if let Some(score) = result.applicable_confidence() {
            confidence_sum += score;
            confidence_n += 1;
        }
    }

    if confidence_n > 0 {
        summary.average_confidence = Some(confidence_sum / confidence_n as f64);
    }

    summary
}

/// 欠陥ラベルごとの出現数
pub fn defect_type_histogram(results: &[InspectionResult]) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for result in results.iter().filter(|r| !r.is_failed()) {
        for defect in &result.defects {
            *histogram.entry(defect.label.clone()).or_insert(0) += 1;
        }
    }
    histogram
}
