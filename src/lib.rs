//! PCB欠陥検査クライアント
//!
//! 画像を検査バックエンドへ送信し、結果をセッションとして蓄積・表示・ダウンロードする。

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod processor;
pub mod scanner;
pub mod session;
pub mod viewer;
