use crate::core::comparator::{
    Classification, ComparisonError, DirectoryComparator, LevelComparator,
};
use crate::core::event::{LogSink, SyncEvent, SyncEventKind};
use crate::core::pool::{PendingTask, TaskPool};
use crate::core::transfer::{CopyOutcome, CopyTask};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// 单个目录对同步失败的原因，只影响该目录对及其子树
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("目录 '{}' 不存在", .0.display())]
    MissingSource(PathBuf),
    #[error("无法创建目录 '{}': {}", .path.display(), .source)]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error("目录比较任务异常终止: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// 同步报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub files_copied: u64,
    pub directories_copied: u64,
    pub directories_created: u64,
    pub copy_failures: u64,
    pub pair_failures: u64,
    pub duration: Duration,
}

impl SyncReport {
    /// 没有任何失败
    pub fn is_clean(&self) -> bool {
        self.copy_failures == 0 && self.pair_failures == 0
    }

    /// 耗时，格式为 `H:MM:SS.ffffff`
    pub fn elapsed_display(&self) -> String {
        let total = self.duration.as_secs();
        format!(
            "{}:{:02}:{:02}.{:06}",
            total / 3600,
            (total % 3600) / 60,
            total % 60,
            self.duration.subsec_micros()
        )
    }
}

/// 一次同步运行中的事件计数，同时把事件转发给真正的接收端
struct RunSink {
    inner: Arc<dyn LogSink>,
    files_copied: AtomicU64,
    directories_copied: AtomicU64,
    directories_created: AtomicU64,
    copy_failures: AtomicU64,
    pair_failures: AtomicU64,
}

impl RunSink {
    fn new(inner: Arc<dyn LogSink>) -> Self {
        Self {
            inner,
            files_copied: AtomicU64::new(0),
            directories_copied: AtomicU64::new(0),
            directories_created: AtomicU64::new(0),
            copy_failures: AtomicU64::new(0),
            pair_failures: AtomicU64::new(0),
        }
    }

    fn report(&self, duration: Duration) -> SyncReport {
        SyncReport {
            files_copied: self.files_copied.load(Ordering::Relaxed),
            directories_copied: self.directories_copied.load(Ordering::Relaxed),
            directories_created: self.directories_created.load(Ordering::Relaxed),
            copy_failures: self.copy_failures.load(Ordering::Relaxed),
            pair_failures: self.pair_failures.load(Ordering::Relaxed),
            duration,
        }
    }
}

impl LogSink for RunSink {
    fn record(&self, event: SyncEvent) {
        let counter = match event.kind {
            SyncEventKind::FileCopied { .. } => &self.files_copied,
            SyncEventKind::DirectoryCopied { .. } => &self.directories_copied,
            SyncEventKind::DirectoryCreated { .. } => &self.directories_created,
            SyncEventKind::CopyFailed { .. } => &self.copy_failures,
            SyncEventKind::PairFailed { .. } => &self.pair_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.inner.record(event);
    }
}

/// 双向同步引擎
///
/// 每一层目录：先派发本层的复制任务，再在当前上下文中依次递归公共子目录，
/// 最后等待本层派发的所有任务完成后才返回。
pub struct SyncEngine {
    comparator: Arc<dyn LevelComparator>,
    pool: Arc<dyn TaskPool>,
    sink: Arc<dyn LogSink>,
}

impl SyncEngine {
    pub fn new(pool: Arc<dyn TaskPool>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            comparator: Arc::new(DirectoryComparator::new()),
            pool,
            sink,
        }
    }

    /// 替换目录比较器，例如使用带时间容差的 [`DirectoryComparator`]
    pub fn with_comparator(mut self, comparator: impl LevelComparator + 'static) -> Self {
        self.comparator = Arc::new(comparator);
        self
    }

    /// 同步两个目录树，返回时整棵子树已经收敛或失败
    ///
    /// `dir_a` 必须存在；`dir_b` 不存在时会被创建。
    pub async fn sync(&self, dir_a: &Path, dir_b: &Path) -> SyncReport {
        let start = Instant::now();
        let run = Arc::new(RunSink::new(self.sink.clone()));

        info!("同步目录: {} <-> {}", dir_a.display(), dir_b.display());
        self.sync_pair(dir_a.to_path_buf(), dir_b.to_path_buf(), &run)
            .await;

        let report = run.report(start.elapsed());
        debug!("同步报告: {:?}", report);
        report
    }

    /// 同步一个目录对；失败只记录，不向上传播
    fn sync_pair<'a>(
        &'a self,
        dir_a: PathBuf,
        dir_b: PathBuf,
        run: &'a Arc<RunSink>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if let Err(e) = self.sync_level(&dir_a, &dir_b, run).await {
                run.record(SyncEvent::new(SyncEventKind::PairFailed {
                    dir_a,
                    dir_b,
                    reason: e.to_string(),
                }));
            }
        }
        .boxed()
    }

    async fn sync_level(
        &self,
        dir_a: &Path,
        dir_b: &Path,
        run: &Arc<RunSink>,
    ) -> Result<(), SyncError> {
        if !dir_a.exists() {
            return Err(SyncError::MissingSource(dir_a.to_path_buf()));
        }
        if !dir_b.exists() {
            std::fs::create_dir_all(dir_b).map_err(|source| SyncError::CreateDestination {
                path: dir_b.to_path_buf(),
                source,
            })?;
            run.record(SyncEvent::new(SyncEventKind::DirectoryCreated {
                path: dir_b.to_path_buf(),
            }));
        }

        let classification = self.classify(dir_a, dir_b).await?;
        let mut pending = Vec::with_capacity(classification.copy_count());

        for name in &classification.only_in_a {
            pending.push(self.dispatch(dir_a.join(name), dir_b.join(name), run));
        }
        for name in &classification.only_in_b {
            pending.push(self.dispatch(dir_b.join(name), dir_a.join(name), run));
        }
        // 两个方向都复制，最终内容取决于哪个写入最后完成
        for name in &classification.diff_files {
            pending.push(self.dispatch(dir_a.join(name), dir_b.join(name), run));
            pending.push(self.dispatch(dir_b.join(name), dir_a.join(name), run));
        }

        for name in &classification.common_dirs {
            self.recurse(dir_a, dir_b, name, run).await;
        }

        // 本层屏障：只等待本层派发的任务，子目录的任务在递归返回前已经完成
        join_all(pending.into_iter().map(PendingTask::wait)).await;
        Ok(())
    }

    async fn recurse(&self, dir_a: &Path, dir_b: &Path, name: &OsString, run: &Arc<RunSink>) {
        self.sync_pair(dir_a.join(name), dir_b.join(name), run).await;
    }

    /// 在阻塞线程池中比较目录，避免阻塞异步运行时
    async fn classify(&self, dir_a: &Path, dir_b: &Path) -> Result<Classification, SyncError> {
        let comparator = self.comparator.clone();
        let (a, b) = (dir_a.to_path_buf(), dir_b.to_path_buf());
        let classification =
            tokio::task::spawn_blocking(move || comparator.compare(&a, &b)).await??;
        Ok(classification)
    }

    fn dispatch(&self, source: PathBuf, destination: PathBuf, run: &Arc<RunSink>) -> PendingTask {
        debug!(
            "派发复制任务: {} -> {}",
            source.display(),
            destination.display()
        );
        let task = CopyTask::new(source, destination);
        let run = run.clone();

        self.pool.dispatch(Box::new(move || {
            let kind = match task.run() {
                Ok(CopyOutcome::File { .. }) => SyncEventKind::FileCopied {
                    source: task.source,
                    destination: task.destination,
                },
                Ok(CopyOutcome::Directory { .. }) => SyncEventKind::DirectoryCopied {
                    source: task.source,
                    destination: task.destination,
                },
                Err(e) => SyncEventKind::CopyFailed {
                    source: task.source,
                    destination: task.destination,
                    reason: e.reason(),
                },
            };
            run.record(SyncEvent::new(kind));
        }))
    }
}
