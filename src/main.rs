use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pcb_inspect::client::{HttpBackend, InferenceParams, InspectionBackend};
use pcb_inspect::processor::{self, ProgressEvent, Processor};
use pcb_inspect::session::{ResultCache, SessionStore};
use pcb_inspect::cli::{Cli, Commands, DownloadTarget};
use pcb_inspect::config::Config;
use pcb_inspect::error::{InspectError, Result};
use pcb_inspect::{export, scanner, viewer};
use pcb_inspect_common::{defect_type_histogram, render, summarize, InspectionResult, ResultViewState, ViewMode};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    let store = SessionStore::new(config.session_dir()?);

    match cli.command {
        Commands::Inspect { paths, batch, append, concurrency, timeout, conf, iou, use_cache, recursive } => {
            println!("🔍 pcb-inspect - 欠陥検査\n");

            if let Some(seconds) = timeout {
                config.timeout_seconds = seconds;
            }

            // 1. 画像選択
            println!("[1/3] 画像を選択中...");
            let selection = scanner::select_images(&paths, recursive)?;
            if !selection.skipped.is_empty() {
                println!(
                    "⚠ {}件のファイルをスキップしました（PNG/JPG/JPEGのみ対応）",
                    selection.skipped.len()
                );
            }
            if !selection.duplicates.is_empty() {
                println!(
                    "⚠ 同名の画像{}件を除外しました（ファイル名で結果を識別するため）",
                    selection.duplicates.len()
                );
                for path in &selection.duplicates {
                    tracing::debug!(path = %path.display(), "duplicate file name skipped");
                }
            }
            let queue = selection.queue;
            println!("✔ {}枚の画像を選択\n", queue.len());

            let backend = HttpBackend::from_config(&config)?;
            match backend.health().await {
                Ok(health) if health.is_healthy() => {}
                Ok(health) => println!("⚠ バックエンドの状態: {}", health.status),
                Err(e) => tracing::warn!(error = %e, "health check failed"),
            }

            // 2. 検査
            let initial = if append { store.load() } else { ResultViewState::new() };
            let state = processor::shared(initial);
            let mut cache = use_cache.then(|| ResultCache::load(store.dir()));

            println!(
                "[2/3] 検査中...{}",
                if batch { " (一括送信)" } else if use_cache { " (キャッシュ有効)" } else { "" }
            );

            let bar = ProgressBar::new(queue.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40}] {pos}/{len}")
                    .map_err(|e| InspectError::CliExecution(e.to_string()))?
                    .progress_chars("=> "),
            );
            let on_progress = |event: &ProgressEvent| {
                bar.set_position(event.completed as u64);
                bar.set_message(event.current.clone());
            };

            let params = InferenceParams {
                conf_threshold: conf.unwrap_or(config.conf_threshold),
                iou_threshold: iou.unwrap_or(config.iou_threshold),
            };

            let mut runner = Processor::new(&backend, state.clone())
                .with_concurrency(concurrency.unwrap_or(config.concurrency));
            if let Some(cache) = cache.as_mut() {
                runner = runner.with_cache(cache);
            }

            let outcome = tokio::select! {
                result = async {
                    if batch {
                        runner.run_batch(&queue, &params, on_progress).await
                    } else {
                        runner.run_progressive(&queue, on_progress).await
                    }
                } => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            drop(runner);
            bar.finish_and_clear();

            let Some(outcome) = outcome else {
                processor::lock(&state)?.reset();
                store.clear()?;
                println!("⚠ 中断しました。セッションをクリアしました");
                return Ok(());
            };

            let snapshot = processor::lock(&state)?.clone();
            store.save(&snapshot)?;
            if let Some(cache) = &cache {
                cache.save(store.dir())?;
            }

            let report = match outcome {
                Ok(report) => report,
                Err(e) => {
                    println!("✖ 処理を中断しました: {}", e);
                    println!("  取得済みの{}件は保持されています", snapshot.len());
                    return Err(e);
                }
            };

            println!(
                "✔ 検査完了 ({}件{}{})\n",
                report.appended,
                if report.failed > 0 { format!(", 失敗{}件", report.failed) } else { String::new() },
                if report.cached > 0 { format!(", キャッシュ{}件", report.cached) } else { String::new() },
            );

            // 3. 集計
            println!("[3/3] 集計");
            println!("{}", render::render_summary(&snapshot.summary()));
            println!("{}", render::render_histogram(&snapshot.defect_type_histogram()));
            println!("✅ 完了: `pcb-inspect view` で結果を確認できます");
        }

        Commands::View { grid, index, once, filter } => {
            let mut state = store.load();

            let filter = filter.to_filter();
            if !filter.is_empty() {
                print!("{}", render::render_filtered(&state, &state.filter(&filter)));
                return Ok(());
            }

            if grid && state.view_mode() != ViewMode::Grid {
                state.toggle_view_mode();
            }
            if let Some(n) = index {
                let n = n
                    .checked_sub(1)
                    .ok_or_else(|| InspectError::InvalidInput("番号は1から指定してください".into()))?;
                state.select(n)?;
            }

            if once {
                print!("{}", render::render(&state, config.grid_columns));
            } else {
                viewer::run_interactive(&mut state, config.grid_columns)?;
            }

            if !state.is_empty() {
                store.save(&state)?;
            }
        }

        Commands::Summary { filter } => {
            let state = store.load();
            let filter = filter.to_filter();
            let results = state.filtered_results(&filter);

            println!("📊 pcb-inspect - 集計\n");
            if !filter.is_empty() {
                println!("{}件 / 全{}件が条件に一致\n", results.len(), state.len());
            }
            println!("{}", render::render_summary(&summarize(&results)));
            println!("欠陥種別:");
            print!("{}", render::render_histogram(&defect_type_histogram(&results)));
        }

        Commands::Download { target, index, all, kind, output } => {
            let state = store.load();
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));

            if state.is_empty() {
                return Err(InspectError::InvalidInput("ダウンロードできる結果がありません".into()));
            }

            let backend = HttpBackend::from_config(&config)?;
            println!("- ダウンロード中...");

            let saved = match target {
                DownloadTarget::Image => {
                    export::download_image(&backend, pick(&state, index)?, kind, &output_dir).await?
                }
                DownloadTarget::Csv if all => {
                    export::download_combined_csv(&backend, state.results(), &output_dir).await?
                }
                DownloadTarget::Csv => {
                    export::download_item_csv(&backend, pick(&state, index)?, &output_dir).await?
                }
                DownloadTarget::Zip => export::download_zip(&backend, state.results(), &output_dir).await?,
                DownloadTarget::Report => {
                    export::download_report(&backend, pick(&state, index)?, &output_dir).await?
                }
                DownloadTarget::Json => export::export_json(&state, &output_dir)?,
            };

            println!("✔ 保存しました: {}", saved.display());
        }

        Commands::Health => {
            let backend = HttpBackend::from_config(&config)?;
            match backend.health().await {
                Ok(health) if health.is_healthy() => {
                    println!("✔ バックエンドに接続しました: {}", backend.base_url());
                }
                Ok(health) => {
                    println!("⚠ バックエンドが利用できません: {} ({})", backend.base_url(), health.status);
                }
                Err(e) => {
                    println!("✖ 接続に失敗しました: {} ({})", backend.base_url(), e);
                }
            }
        }

        Commands::Clear { local_only, cache } => {
            match store.clear()? {
                true => println!("✔ セッションを削除しました: {}", store.path().display()),
                false => println!("セッションファイルが存在しません"),
            }

            if cache && ResultCache::clear(store.dir())? {
                println!("✔ キャッシュを削除しました");
            }

            if !local_only {
                let backend = HttpBackend::from_config(&config)?;
                if let Err(e) = backend.clear_session().await {
                    tracing::warn!(error = %e, "backend session clear failed");
                }
            }
        }

        Commands::Config { set_backend_url, set_timeout, show } => {
            if let Some(url) = set_backend_url {
                config.set_backend_url(url)?;
                println!("✔ バックエンドURLを設定しました");
            }

            if let Some(seconds) = set_timeout {
                config.set_timeout(seconds)?;
                println!("✔ タイムアウトを設定しました");
            }

            if show {
                println!("設定:");
                println!("  バックエンド: {}", config.backend_url);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  信頼度しきい値: {}", config.conf_threshold);
                println!("  IoUしきい値: {}", config.iou_threshold);
                println!("  同時リクエスト数: {}", config.concurrency);
                println!("  セッション保存先: {}", store.dir().display());
                if let Some(info) = store.info() {
                    println!(
                        "  保存済みセッション: {}件 ({})",
                        info.result_count,
                        info.saved_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
    }

    Ok(())
}

/// 番号指定（1始まり）または選択中の結果
fn pick(state: &ResultViewState, index: Option<usize>) -> Result<&InspectionResult> {
    match index {
        Some(n) => n
            .checked_sub(1)
            .and_then(|i| state.get(i))
            .ok_or_else(|| InspectError::InvalidInput(format!("番号が範囲外です: {} (全{}件)", n, state.len()))),
        None => state
            .selected()
            .ok_or_else(|| InspectError::InvalidInput("選択中の結果がありません".into())),
    }
}
