use crate::export::ImageKind;
use clap::{Args, Parser, Subcommand};
use pcb_inspect_common::{ResultFilter, Status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pcb-inspect")]
#[command(about = "PCB欠陥検査クライアント・結果ビューア", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像をアップロードして検査
    Inspect {
        /// 画像ファイルまたはフォルダ
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// 1リクエストでまとめて送信（既定は1枚ずつ）
        #[arg(long)]
        batch: bool,

        /// 既存セッションに追加（既定は新しいセッションを開始）
        #[arg(long)]
        append: bool,

        /// 同時リクエスト数（結果の順序は保持される）
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// リクエストごとのタイムアウト秒
        #[arg(long)]
        timeout: Option<u64>,

        /// 信頼度しきい値（一括送信時）
        #[arg(long)]
        conf: Option<f32>,

        /// IoUしきい値（一括送信時）
        #[arg(long)]
        iou: Option<f32>,

        /// キャッシュを使用（同じ画像の再送信をスキップ）
        #[arg(long)]
        use_cache: bool,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// 検査結果を表示
    View {
        /// グリッド表示で開始
        #[arg(long)]
        grid: bool,

        /// 表示する番号（1始まり）
        #[arg(short, long)]
        index: Option<usize>,

        /// 1回表示して終了（対話しない）
        #[arg(long)]
        once: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// 集計と欠陥種別の分布を表示
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// 成果物をダウンロード
    Download {
        /// 対象 (image/csv/zip/report/json)
        #[arg(required = true)]
        target: DownloadTarget,

        /// 対象の番号（1始まり、省略時は選択中）
        #[arg(short, long)]
        index: Option<usize>,

        /// 全件まとめて（csvのみ）
        #[arg(long)]
        all: bool,

        /// 画像の種類 (original/annotated)
        #[arg(long, default_value = "annotated")]
        kind: ImageKind,

        /// 保存先ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// バックエンドの死活確認
    Health,

    /// セッションをクリア
    Clear {
        /// バックエンド側のセッションは残す
        #[arg(long)]
        local_only: bool,

        /// キャッシュも削除
        #[arg(long)]
        cache: bool,
    },

    /// 設定を表示/編集
    Config {
        /// バックエンドURLを設定
        #[arg(long)]
        set_backend_url: Option<String>,

        /// タイムアウト秒を設定
        #[arg(long)]
        set_timeout: Option<u64>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

/// 結果の絞り込み条件
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// 画像名で絞り込み（部分一致）
    #[arg(long)]
    pub name: Option<String>,

    /// 欠陥種別で絞り込み
    #[arg(long)]
    pub defect: Option<String>,

    /// 欠陥数の下限
    #[arg(long, default_value_t = 0)]
    pub min_defects: usize,

    /// ステータスで絞り込み (pass/defect/not_pcb/error)
    #[arg(long, conflicts_with = "failed_only")]
    pub status: Option<Status>,

    /// 処理に失敗した画像のみ
    #[arg(long)]
    pub failed_only: bool,
}

impl FilterArgs {
    pub fn to_filter(&self) -> ResultFilter {
        ResultFilter {
            name: self.name.clone(),
            defect_type: self.defect.clone(),
            min_defects: self.min_defects,
            status: if self.failed_only { Some(Status::Failed) } else { self.status },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadTarget {
    Image,
    Csv,
    Zip,
    Report,
    Json,
}

impl std::str::FromStr for DownloadTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" | "img" => Ok(DownloadTarget::Image),
            "csv" => Ok(DownloadTarget::Csv),
            "zip" => Ok(DownloadTarget::Zip),
            "report" | "pdf" => Ok(DownloadTarget::Report),
            "json" => Ok(DownloadTarget::Json),
            _ => Err(format!("Unknown target: {}. Use image, csv, zip, report, or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["pcb-inspect", "inspect", "a.jpg", "boards/", "--batch", "-c", "4"]).unwrap();
        match cli.command {
            Commands::Inspect { paths, batch, concurrency, .. } => {
                assert_eq!(paths.len(), 2);
                assert!(batch);
                assert_eq!(concurrency, Some(4));
            }
            _ => panic!("inspect expected"),
        }
    }

    #[test]
    fn test_parse_view_filter() {
        let cli = Cli::try_parse_from([
            "pcb-inspect", "view", "--once", "--name", "lot2", "--defect", "Short", "--min-defects", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::View { filter, once, .. } => {
                assert!(once);
                let filter = filter.to_filter();
                assert_eq!(filter.name.as_deref(), Some("lot2"));
                assert_eq!(filter.defect_type.as_deref(), Some("Short"));
                assert_eq!(filter.min_defects, 2);
                assert_eq!(filter.status, None);
            }
            _ => panic!("view expected"),
        }
    }

    #[test]
    fn test_parse_summary_failed_only() {
        let cli = Cli::try_parse_from(["pcb-inspect", "summary", "--failed-only"]).unwrap();
        match cli.command {
            Commands::Summary { filter } => {
                assert_eq!(filter.to_filter(), ResultFilter::failed_only());
            }
            _ => panic!("summary expected"),
        }

        let cli = Cli::try_parse_from(["pcb-inspect", "summary"]).unwrap();
        match cli.command {
            Commands::Summary { filter } => assert!(filter.to_filter().is_empty()),
            _ => panic!("summary expected"),
        }

        assert!(Cli::try_parse_from(["pcb-inspect", "summary", "--failed-only", "--status", "pass"]).is_err());
    }

    #[test]
    fn test_parse_download_target() {
        assert_eq!("CSV".parse::<DownloadTarget>().unwrap(), DownloadTarget::Csv);
        assert_eq!("pdf".parse::<DownloadTarget>().unwrap(), DownloadTarget::Report);
        assert!("tar".parse::<DownloadTarget>().is_err());
    }
}
