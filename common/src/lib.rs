//! PCB Inspect Common Library
//!
//! CLIと各種フロントエンドで共有される型・状態管理・描画

pub mod types;
pub mod error;
pub mod parser;
pub mod filter;
pub mod view_state;
pub mod summary;
pub mod render;

pub use types::{BoundingBox, Defect, ImagePaths, InspectionResult, Status};
pub use error::{Error, Result};
pub use parser::{extract_error_message, parse_batch_response, parse_item_response, ItemResponse};
pub use filter::ResultFilter;
pub use view_state::{Generation, ResultViewState, ViewMode};
pub use summary::{defect_type_histogram, summarize, Summary};
