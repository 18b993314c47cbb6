//! 結果の絞り込み
//!
//! 画像名・欠陥種別・欠陥数・ステータスで蓄積済みの結果を絞り込む。
//! 状態は変更せず、一致した結果のインデックスを返す。

use crate::types::{InspectionResult, Status};

/// 絞り込み条件（未指定の条件はすべて一致扱い）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFilter {
    /// 画像名の部分一致（大文字小文字を区別しない）
    pub name: Option<String>,
    /// 欠陥種別（大文字小文字を区別しない）
    pub defect_type: Option<String>,
    pub min_defects: usize,
    pub status: Option<Status>,
}

impl ResultFilter {
    /// 処理に失敗した結果のみ
    pub fn failed_only() -> Self {
        Self {
            status: Some(Status::Failed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, result: &InspectionResult) -> bool {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if !result.identifier.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }

        if let Some(label) = self.defect_type.as_deref() {
            if !result.defects.iter().any(|d| d.label.eq_ignore_ascii_case(label.trim())) {
                return false;
            }
        }

        if let Some(status) = self.status {
            if result.status != status {
                return false;
            }
        }

        result.defect_count() >= self.min_defects
    }

    /// 一致した結果のインデックス（元の順序を保持）
    pub fn apply(&self, results: &[InspectionResult]) -> Vec<usize> {
        results
            .iter()
            .enumerate()
            .filter(|(_, r)| self.matches(r))
            .map(|(i, _)| i)
            .collect()
    }
}
