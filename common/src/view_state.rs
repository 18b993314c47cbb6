//! 結果表示状態
//!
//! セッション中に蓄積された検査結果・選択中のインデックス・表示モードを保持する。
//! 状態の変更はすべてここのメソッドを経由し、描画側は読み取りのみ行う。

use crate::error::{Error, Result};
use crate::filter::ResultFilter;
use crate::summary::{self, Summary};
use crate::types::InspectionResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// 表示モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// 1件ずつ大きく表示（カルーセル）
    #[default]
    Expanded,
    /// 全件をカードで一覧表示
    Grid,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Expanded => ViewMode::Grid,
            ViewMode::Grid => ViewMode::Expanded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Expanded => "expanded",
            ViewMode::Grid => "grid",
        }
    }
}

/// リセット世代トークン
///
/// リクエスト開始時に取得し、応答の追加時に照合する。
/// 途中で `reset()` された場合、古い応答は破棄される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

#[derive(Debug, Clone, Default)]
pub struct ResultViewState {
    results: Vec<InspectionResult>,
    selected_index: Option<usize>,
    view_mode: ViewMode,
    generation: u64,
}

impl ResultViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みの状態から復元
    ///
    /// 識別子の重複を解消し、選択インデックスを範囲内に丸める。
    pub fn restore(
        results: Vec<InspectionResult>,
        selected_index: Option<usize>,
        view_mode: ViewMode,
    ) -> Self {
        let mut state = Self::new();
        for result in results {
            state.append(result);
        }
        state.view_mode = view_mode;
        state.selected_index = match (state.results.len(), selected_index) {
            (0, _) => None,
            (len, Some(i)) => Some(i.min(len - 1)),
            (_, None) => Some(0),
        };
        state
    }

    pub fn results(&self) -> &[InspectionResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&InspectionResult> {
        self.results.get(index)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&InspectionResult> {
        self.selected_index.and_then(|i| self.results.get(i))
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    pub fn is_current(&self, token: Generation) -> bool {
        token.0 == self.generation
    }

    /// 末尾に結果を追加し、そのインデックスを返す
    ///
    /// 最初の1件で選択インデックスが0になる。
    /// 識別子が重複する場合は `name (2)` のように連番を付ける。
    pub fn append(&mut self, mut result: InspectionResult) -> usize {
        result.identifier = self.unique_identifier(&result.identifier);
        self.results.push(result);
        if self.selected_index.is_none() {
            self.selected_index = Some(0);
        }
        self.results.len() - 1
    }

    /// 世代が一致する場合のみ追加
    pub fn append_if_current(&mut self, token: Generation, result: InspectionResult) -> Option<usize> {
        if self.is_current(token) {
            Some(self.append(result))
        } else {
            None
        }
    }

    /// 全結果を破棄して初期状態に戻す
    pub fn reset(&mut self) {
        self.results.clear();
        self.selected_index = None;
        self.view_mode = ViewMode::Expanded;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.results.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.results.len(),
            });
        }
        self.selected_index = Some(index);
        Ok(())
    }

    /// 循環的に移動（先頭の前は末尾、末尾の次は先頭）
    pub fn navigate(&mut self, delta: isize) -> Option<usize> {
        let len = self.results.len();
        if len == 0 {
            return None;
        }
        let current = self.selected_index.unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len as isize) as usize;
        self.selected_index = Some(next);
        Some(next)
    }

    pub fn next(&mut self) -> Option<usize> {
        self.navigate(1)
    }

    pub fn previous(&mut self) -> Option<usize> {
        self.navigate(-1)
    }

    pub fn toggle_view_mode(&mut self) -> ViewMode {
        self.view_mode = self.view_mode.toggled();
        self.view_mode
    }

    pub fn summary(&self) -> Summary {
        summary::summarize(&self.results)
    }

    pub fn defect_type_histogram(&self) -> BTreeMap<String, usize> {
        summary::defect_type_histogram(&self.results)
    }

    /// 条件に一致する結果のインデックス
    pub fn filter(&self, filter: &ResultFilter) -> Vec<usize> {
        filter.apply(&self.results)
    }

    /// 条件に一致する結果の複製
    pub fn filtered_results(&self, filter: &ResultFilter) -> Vec<InspectionResult> {
        self.results.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    /// 条件に一致する結果のみの集計
    pub fn filtered_summary(&self, filter: &ResultFilter) -> Summary {
        summary::summarize(&self.filtered_results(filter))
    }

    fn unique_identifier(&self, identifier: &str) -> String {
        let base = if identifier.trim().is_empty() {
            format!("item-{}", self.results.len() + 1)
        } else {
            identifier.to_string()
        };

        let taken: HashSet<&str> = self.results.iter().map(|r| r.identifier.as_str()).collect();
        if !taken.contains(base.as_str()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{} ({})", base, n);
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Defect, Status};

    fn item(name: &str) -> InspectionResult {
        InspectionResult {
            identifier: name.into(),
            confidence_score: Some(0.9),
            ..Default::default()
        }
    }

    fn state_with(n: usize) -> ResultViewState {
        let mut state = ResultViewState::new();
        for i in 0..n {
            state.append(item(&format!("img_{}.jpg", i)));
        }
        state
    }

    #[test]
    fn test_append_sets_first_selection() {
        let mut state = ResultViewState::new();
        assert_eq!(state.selected_index(), None);
        state.append(item("a.jpg"));
        assert_eq!(state.selected_index(), Some(0));
        state.append(item("b.jpg"));
        assert_eq!(state.selected_index(), Some(0));
    }

    #[test]
    fn test_append_preserves_order() {
        let state = state_with(4);
        let names: Vec<_> = state.results().iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(names, vec!["img_0.jpg", "img_1.jpg", "img_2.jpg", "img_3.jpg"]);
    }

    #[test]
    fn test_length_is_appends_since_last_reset() {
        let mut state = state_with(3);
        state.reset();
        state.append(item("x.jpg"));
        state.append(item("y.jpg"));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_duplicate_identifier_gets_suffix() {
        let mut state = ResultViewState::new();
        state.append(item("a.jpg"));
        state.append(item("a.jpg"));
        state.append(item("a.jpg"));
        assert_eq!(state.get(1).unwrap().identifier, "a.jpg (2)");
        assert_eq!(state.get(2).unwrap().identifier, "a.jpg (3)");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = state_with(3);
        state.toggle_view_mode();
        state.reset();
        assert_eq!(state.len(), 0);
        assert_eq!(state.selected_index(), None);
        assert_eq!(state.view_mode(), ViewMode::Expanded);
    }

    #[test]
    fn test_select_out_of_range() {
        let mut state = state_with(2);
        assert!(state.select(1).is_ok());
        assert_eq!(state.selected_index(), Some(1));
        let err = state.select(2).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: 2, len: 2 }));
        assert_eq!(state.selected_index(), Some(1));

        let mut empty = ResultViewState::new();
        assert!(empty.select(0).is_err());
    }

    #[test]
    fn test_navigate_wraps() {
        let mut state = state_with(3);
        assert_eq!(state.previous(), Some(2));
        assert_eq!(state.next(), Some(0));
        state.select(2).unwrap();
        assert_eq!(state.next(), Some(0));
        assert_eq!(state.next(), Some(1));
    }

    #[test]
    fn test_navigate_empty_is_noop() {
        let mut state = ResultViewState::new();
        assert_eq!(state.next(), None);
        assert_eq!(state.previous(), None);
        assert_eq!(state.selected_index(), None);
    }

    #[test]
    fn test_toggle_keeps_results_and_selection() {
        let mut state = state_with(3);
        state.select(2).unwrap();
        assert_eq!(state.toggle_view_mode(), ViewMode::Grid);
        assert_eq!(state.len(), 3);
        assert_eq!(state.selected_index(), Some(2));
        assert_eq!(state.toggle_view_mode(), ViewMode::Expanded);
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let mut state = state_with(1);
        let token = state.generation();
        state.reset();
        assert_eq!(state.append_if_current(token, item("late.jpg")), None);
        assert!(state.is_empty());

        let fresh = state.generation();
        assert_eq!(state.append_if_current(fresh, item("ok.jpg")), Some(0));
    }

    #[test]
    fn test_restore_clamps_selection() {
        let results = vec![item("a.jpg"), item("b.jpg")];
        let state = ResultViewState::restore(results, Some(7), ViewMode::Grid);
        assert_eq!(state.selected_index(), Some(1));
        assert_eq!(state.view_mode(), ViewMode::Grid);

        let empty = ResultViewState::restore(Vec::new(), Some(3), ViewMode::Expanded);
        assert_eq!(empty.selected_index(), None);
    }

    #[test]
    fn test_filter_keeps_state() {
        let mut state = state_with(3);
        state.append(InspectionResult::failed("bad.jpg", "timeout"));
        state.select(1).unwrap();

        let filter = ResultFilter::failed_only();
        assert_eq!(state.filter(&filter), vec![3]);
        assert_eq!(state.filtered_summary(&filter).total_count, 1);
        assert_eq!(state.filtered_summary(&filter).failed_count, 1);
        assert_eq!(state.len(), 4);
        assert_eq!(state.selected_index(), Some(1));
    }

    #[test]
    fn test_summary_scenario() {
        let mut state = ResultViewState::new();
        state.append(InspectionResult {
            identifier: "pass.jpg".into(),
            status: Status::Pass,
            confidence_score: Some(0.95),
            ..Default::default()
        });
        state.append(InspectionResult {
            identifier: "defect.jpg".into(),
            status: Status::Defect,
            confidence_score: Some(0.80),
            defects: vec![Defect {
                label: "Mouse_bite".into(),
                confidence: 0.8,
                bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            }],
            ..Default::default()
        });
        state.append(InspectionResult {
            identifier: "other.jpg".into(),
            status: Status::NotApplicable,
            ..Default::default()
        });

        let summary = state.summary();
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.defect_count(), 1);
        assert_eq!(summary.defect_instances, 1);
        assert!((summary.average_confidence.unwrap() - 0.875).abs() < 1e-9);
        assert_eq!(state.defect_type_histogram().get("Mouse_bite"), Some(&1));
    }
}
