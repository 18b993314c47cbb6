use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("画像が選択されていません: {0}")]
    NoImagesFound(String),

    #[error("入力エラー: {0}")]
    InvalidInput(String),

    #[error("バックエンドへのリクエストに失敗: {0}")]
    Request(String),

    #[error("バックエンドのレスポンスが不正: {0}")]
    ResponseParse(String),

    #[error("ダウンロードエラー: {0}")]
    Download(String),

    #[error("セッションエラー: {0}")]
    Session(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Common(#[from] pcb_inspect_common::Error),

    #[error("CLI実行エラー: {0}")]
    CliExecution(String),
}

pub type Result<T> = std::result::Result<T, InspectError>;
