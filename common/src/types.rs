//! 検査結果の型定義
//!
//! バックエンドが返すJSONの正規スキーマ。旧フロントエンドで使われていた
//! フィールド名（`filename`, `pcb_confidence`, `detections` など）は
//! 入力時のみエイリアスとして受け付ける。

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 検査ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Status {
    /// 欠陥なし
    #[default]
    Pass,
    /// 欠陥あり
    Defect,
    /// PCBとして認識されなかった画像
    NotApplicable,
    /// 処理に失敗した項目（クライアント側で付与）
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Defect => "DEFECT",
            Status::NotApplicable => "NOT_PCB",
            Status::Failed => "ERROR",
        }
    }

    /// 信頼度スコアが意味を持つステータスか
    pub fn is_applicable(&self) -> bool {
        matches!(self, Status::Pass | Status::Defect)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            // success は処理成功の意味で、合否は normalize() が欠陥リストから決める
            "pass" | "ok" | "good" | "success" | "completed" => Ok(Status::Pass),
            // FAIL は検査判定（不合格）。処理失敗は error / failed
            "defect" | "defective" | "fail" => Ok(Status::Defect),
            "notpcb" | "notapplicable" | "na" => Ok(Status::NotApplicable),
            "error" | "failed" => Ok(Status::Failed),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 未知の値は暫定的に `Pass` として読み込み、`normalize()` で決め直す
impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

/// バウンディングボックス（ピクセル座標）
///
/// JSON上は `[x1, y1, x2, y2]` 配列。オブジェクト形式も読み込み可。
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "BoxRepr")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.0}, {:.0}, {:.0}, {:.0})", self.x1, self.y1, self.x2, self.y2)
    }
}

impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.x1, self.y1, self.x2, self.y2].serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoxRepr {
    Array([f64; 4]),
    Object { x1: f64, y1: f64, x2: f64, y2: f64 },
}

impl From<BoxRepr> for BoundingBox {
    fn from(repr: BoxRepr) -> Self {
        match repr {
            BoxRepr::Array([x1, y1, x2, y2]) => Self { x1, y1, x2, y2 },
            BoxRepr::Object { x1, y1, x2, y2 } => Self { x1, y1, x2, y2 },
        }
    }
}

/// 検出された欠陥
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Defect {
    #[serde(alias = "defect_type", alias = "class_name")]
    pub label: String,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default, alias = "bounding_box")]
    pub bbox: BoundingBox,
}

/// 画像・レポートへの参照（URLまたはバックエンド相対パス）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePaths {
    #[serde(alias = "image_path", alias = "original_filename", skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,

    #[serde(alias = "annotated_path", alias = "annotated_filename", skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,

    #[serde(alias = "pdf_path", skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

/// 1画像分の検査結果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InspectionResult {
    /// セッション内で一意なキー（ファイル名など）
    #[serde(default, alias = "filename", alias = "file", alias = "original_name")]
    pub identifier: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default, alias = "pcb_confidence", skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    #[serde(default, alias = "detections")]
    pub defects: Vec<Defect>,

    #[serde(default)]
    pub image_paths: ImagePaths,

    /// Base64エンコードされた注釈付き画像（インライン返却時のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,

    #[serde(default, alias = "inference_time_ms", skip_serializing_if = "Option::is_none")]
    pub inference_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InspectionResult {
    /// 処理失敗を表す縮退エントリを作成
    pub fn failed(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: Status::Failed,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    pub fn defect_count(&self) -> usize {
        self.defects.len()
    }

    /// 平均信頼度の計算対象となるスコア
    pub fn applicable_confidence(&self) -> Option<f64> {
        if self.status.is_applicable() {
            self.confidence_score
        } else {
            None
        }
    }

    /// 不変条件を満たすように正規化
    ///
    /// - 信頼度は [0, 1] に丸める
    /// - `error` を持つエントリは `Failed` とし、欠陥を持たない
    /// - `NotApplicable` は欠陥を持たない
    /// - `Pass` / `Defect` は欠陥リストの有無から決め直す
    pub fn normalize(mut self) -> Self {
        if self.error.is_some() {
            self.status = Status::Failed;
        }

        match self.status {
            Status::Failed | Status::NotApplicable => {
                self.defects.clear();
            }
            Status::Pass | Status::Defect => {
                self.status = if self.defects.is_empty() {
                    Status::Pass
                } else {
                    Status::Defect
                };
            }
        }

        self.confidence_score = self.confidence_score.map(clamp_unit);
        for defect in &mut self.defects {
            defect.confidence = clamp_unit(defect.confidence);
        }
        self
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
