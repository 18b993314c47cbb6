//! アップロード・推論処理ループ
//!
//! 結果は常にキューの順序で `ResultViewState` に追加される。
//! 並列数を上げた場合も `buffered` が入力順に結果を返すため順序は保たれる。
//! 処理開始時の世代トークンと一致しない応答（途中でリセットされた場合）は破棄する。

use crate::client::{BackendError, InferenceParams, InspectionBackend};
use crate::error::{InspectError, Result};
use crate::scanner::{UploadFile, UploadQueue};
use crate::session::{compute_file_hash, ResultCache};
use futures::stream::{self, StreamExt};
use pcb_inspect_common::{Generation, InspectionResult, ResultViewState};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub type SharedState = Arc<Mutex<ResultViewState>>;

pub fn shared(state: ResultViewState) -> SharedState {
    Arc::new(Mutex::new(state))
}

pub fn lock(state: &SharedState) -> Result<MutexGuard<'_, ResultViewState>> {
    state
        .lock()
        .map_err(|_| InspectError::Session("状態のロックに失敗しました".into()))
}

/// 進捗通知（完了件数 / 総数）
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub current: String,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// 処理結果の内訳
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub appended: usize,
    pub failed: usize,
    pub cached: usize,
    /// 途中でリセットされ、以降の応答を破棄した
    pub discarded: bool,
}

pub struct Processor<'a, B: InspectionBackend + ?Sized> {
    backend: &'a B,
    state: SharedState,
    concurrency: usize,
    cache: Option<&'a mut ResultCache>,
}

struct Job {
    file: UploadFile,
    hash: Option<String>,
    cached: Option<InspectionResult>,
}

impl<'a, B: InspectionBackend + ?Sized> Processor<'a, B> {
    pub fn new(backend: &'a B, state: SharedState) -> Self {
        Self {
            backend,
            state,
            concurrency: 1,
            cache: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cache(mut self, cache: &'a mut ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 1ファイルずつアップロードして結果を追加する
    ///
    /// 項目単位の失敗は縮退エントリとして追加して続行し、
    /// リクエスト全体の失敗はそこで中断してエラーを返す（追加済みの結果は残る）。
    pub async fn run_progressive<F>(&mut self, queue: &UploadQueue, mut on_progress: F) -> Result<RunReport>
    where
        F: FnMut(&ProgressEvent),
    {
        let token = lock(&self.state)?.generation();
        let total = queue.len();
        let jobs = self.prepare_jobs(queue);
        let backend = self.backend;

        let mut outcomes = stream::iter(jobs.into_iter().map(move |job| async move {
            if let Some(result) = job.cached.clone() {
                return (job, Ok(result), true);
            }
            let outcome = backend.detect_single(&job.file).await;
            (job, outcome, false)
        }))
        .buffered(self.concurrency);

        let mut report = RunReport::default();
        let mut completed = 0;

        while let Some((job, outcome, from_cache)) = outcomes.next().await {
            let entry = match outcome {
                Ok(result) => result,
                Err(BackendError::Item(message)) => {
                    warn!(file = %job.file.file_name, %message, "item failed");
                    InspectionResult::failed(job.file.file_name.clone(), message)
                }
                Err(err) => {
                    warn!(file = %job.file.file_name, error = %err, "request failed, aborting");
                    return Err(err.into());
                }
            };

            if from_cache {
                report.cached += 1;
            } else if let (Some(cache), Some(hash)) = (self.cache.as_deref_mut(), job.hash.as_ref()) {
                if !entry.is_failed() {
                    cache.insert(hash.clone(), job.file.file_name.clone(), entry.clone());
                }
            }

            let failed = entry.is_failed();
            if !self.append(token, entry)? {
                info!("session was reset, discarding remaining responses");
                report.discarded = true;
                return Ok(report);
            }

            report.appended += 1;
            if failed {
                report.failed += 1;
            }
            completed += 1;
            on_progress(&ProgressEvent {
                completed,
                total,
                current: job.file.file_name.clone(),
            });
        }

        Ok(report)
    }

    /// 全ファイルを1リクエストで送信して結果を追加する
    ///
    /// キャッシュ済みのファイルは送信せず、結果はキューの順序で追加する。
    pub async fn run_batch<F>(
        &mut self,
        queue: &UploadQueue,
        params: &InferenceParams,
        mut on_progress: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&ProgressEvent),
    {
        let token = lock(&self.state)?.generation();
        let total = queue.len();
        let jobs = self.prepare_jobs(queue);

        let uploads: Vec<UploadFile> = jobs
            .iter()
            .filter(|job| job.cached.is_none())
            .map(|job| job.file.clone())
            .collect();

        let results = if uploads.is_empty() {
            Vec::new()
        } else {
            self.backend.predict_batch(&uploads, params).await?
        };
        let mut received = results.into_iter();
        debug!(sent = uploads.len(), received = received.len(), "batch response");

        let mut report = RunReport::default();
        for job in jobs {
            let (entry, from_cache) = match job.cached {
                Some(result) => (result, true),
                None => match received.next() {
                    Some(result) => (result, false),
                    None => (
                        InspectionResult::failed(
                            job.file.file_name.clone(),
                            "バックエンドから結果が返されませんでした",
                        ),
                        false,
                    ),
                },
            };

            if from_cache {
                report.cached += 1;
            } else if let (Some(cache), Some(hash)) = (self.cache.as_deref_mut(), job.hash) {
                cache.insert(hash, job.file.file_name.clone(), entry.clone());
            }

            let failed = entry.is_failed();
            if !self.append(token, entry)? {
                report.discarded = true;
                return Ok(report);
            }
            report.appended += 1;
            if failed {
                report.failed += 1;
            }
        }

        // 送信数より多く返された結果も捨てずに追加
        for extra in received {
            warn!(identifier = %extra.identifier, "unexpected extra result in batch response");
            let failed = extra.is_failed();
            if !self.append(token, extra)? {
                report.discarded = true;
                return Ok(report);
            }
            report.appended += 1;
            if failed {
                report.failed += 1;
            }
        }

        on_progress(&ProgressEvent {
            completed: total,
            total,
            current: String::new(),
        });

        Ok(report)
    }

    fn append(&self, token: Generation, result: InspectionResult) -> Result<bool> {
        Ok(lock(&self.state)?.append_if_current(token, result).is_some())
    }

    fn prepare_jobs(&self, queue: &UploadQueue) -> Vec<Job> {
        queue
            .iter()
            .map(|file| {
                let Some(cache) = self.cache.as_deref() else {
                    return Job { file: file.clone(), hash: None, cached: None };
                };
                let hash = compute_file_hash(&file.path).ok();
                let cached = hash.as_deref().and_then(|h| cache.get(h)).map(|r| InspectionResult {
                    identifier: file.file_name.clone(),
                    ..r.clone()
                });
                Job { file: file.clone(), hash, cached }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let event = ProgressEvent { completed: 1, total: 4, current: "a.jpg".into() };
        assert_eq!(event.fraction(), 0.25);
        let empty = ProgressEvent { completed: 0, total: 0, current: String::new() };
        assert_eq!(empty.fraction(), 1.0);
    }
}
