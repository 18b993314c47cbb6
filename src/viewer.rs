//! 対話式結果ビューア
//!
//! ユーザー操作 → 状態操作 → 状態から再描画、の一方向で処理する。

use crate::error::{InspectError, Result};
use dialoguer::Input;
use pcb_inspect_common::render;
use pcb_inspect_common::{ResultFilter, ResultViewState};

/// ビューア操作
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerAction {
    /// 次の結果へ
    Next,
    /// 前の結果へ
    Previous,
    /// 表示モード切り替え
    Toggle,
    /// 番号指定（1始まり）
    Select(usize),
    /// 集計表示
    Summary,
    /// 絞り込み一覧（`f 名前` / `d 欠陥種別` / `x` 失敗のみ）
    Filter(ResultFilter),
    /// 終了
    Quit,
    Unknown(String),
}

pub fn parse_action(input: &str) -> ViewerAction {
    let trimmed = input.trim();
    match trimmed {
        "" | "n" | "N" => ViewerAction::Next,
        "p" | "P" => ViewerAction::Previous,
        "g" | "G" => ViewerAction::Toggle,
        "s" | "S" => ViewerAction::Summary,
        "q" | "Q" => ViewerAction::Quit,
        "x" | "X" => ViewerAction::Filter(ResultFilter::failed_only()),
        _ => {
            if let Some(name) = trimmed.strip_prefix("f ") {
                return ViewerAction::Filter(ResultFilter {
                    name: Some(name.trim().to_string()),
                    ..Default::default()
                });
            }
            if let Some(label) = trimmed.strip_prefix("d ") {
                return ViewerAction::Filter(ResultFilter {
                    defect_type: Some(label.trim().to_string()),
                    ..Default::default()
                });
            }
            match trimmed.parse::<usize>() {
                Ok(n) => ViewerAction::Select(n),
                Err(_) => ViewerAction::Unknown(trimmed.to_string()),
            }
        }
    }
}

/// 操作を状態に適用し、表示するメッセージを返す
pub fn apply_action(state: &mut ResultViewState, action: &ViewerAction) -> Option<String> {
    match action {
        ViewerAction::Next => {
            state.next();
            None
        }
        ViewerAction::Previous => {
            state.previous();
            None
        }
        ViewerAction::Toggle => {
            let mode = state.toggle_view_mode();
            Some(format!("表示モード: {}", mode.as_str()))
        }
        ViewerAction::Select(0) => Some("番号は1から指定してください".to_string()),
        ViewerAction::Select(n) => match state.select(n - 1) {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        },
        ViewerAction::Summary => Some(format!(
            "{}\n{}",
            render::render_summary(&state.summary()),
            render::render_histogram(&state.defect_type_histogram())
        )),
        ViewerAction::Filter(filter) => {
            let indices = state.filter(filter);
            Some(render::render_filtered(state, &indices))
        }
        ViewerAction::Quit => None,
        ViewerAction::Unknown(s) => Some(format!("不明な操作: {}", s)),
    }
}

/// 対話ループ
pub fn run_interactive(state: &mut ResultViewState, grid_columns: usize) -> Result<()> {
    if state.is_empty() {
        println!("表示する結果がありません。先に `pcb-inspect inspect` を実行してください");
        return Ok(());
    }

    println!("操作: [Enter/n]次へ [p]前へ [g]表示切替 [数字]番号指定 [s]集計 [f 名前/d 種別/x]絞り込み [q]終了\n");

    loop {
        println!("{}", render::render(state, grid_columns));

        let input: String = Input::new()
            .with_prompt("操作")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| InspectError::CliExecution(e.to_string()))?;

        let action = parse_action(&input);
        if action == ViewerAction::Quit {
            break;
        }
        if let Some(message) = apply_action(state, &action) {
            println!("{}\n", message);
        }
    }

    Ok(())
}
