//! 复制任务池
//!
//! 引擎通过 [`TaskPool`] 派发复制任务，生产环境使用有界的 [`WorkerPool`]，
//! 测试中可以换成立即执行的 [`ImmediatePool`]。

use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// 派发到任务池的工作单元
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// 任务池接口
pub trait TaskPool: Send + Sync {
    /// 派发一个任务，返回可等待的句柄
    fn dispatch(&self, job: Job) -> PendingTask;
}

/// 已派发任务的句柄
#[derive(Debug)]
pub struct PendingTask {
    handle: Option<JoinHandle<()>>,
}

impl PendingTask {
    /// 已经完成的任务
    pub fn completed() -> Self {
        Self { handle: None }
    }

    /// 等待任务结束；任务内部 panic 只记录日志，不向上传播
    pub async fn wait(self) {
        if let Some(handle) = self.handle {
            if let Err(e) = handle.await {
                error!("复制任务异常终止: {}", e);
            }
        }
    }
}

/// 有界工作池
///
/// 用信号量限制同时运行的任务数，阻塞的文件 IO 放在 `spawn_blocking` 中执行。
/// 必须在 tokio 运行时内调用 [`TaskPool::dispatch`]。
#[derive(Debug)]
pub struct WorkerPool {
    limiter: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            limiter: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// 按可用并行度创建
    pub fn with_available_parallelism() -> Self {
        let size = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 关闭工作池，之后派发的任务不会再执行
    pub fn close(&self) {
        debug!("关闭工作池 (size={})", self.size);
        self.limiter.close();
    }
}

impl TaskPool for WorkerPool {
    fn dispatch(&self, job: Job) -> PendingTask {
        let limiter = self.limiter.clone();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                error!("工作池已关闭，任务被丢弃");
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                error!("复制任务执行失败: {}", e);
            }
        });

        PendingTask {
            handle: Some(handle),
        }
    }
}

/// 立即在调用方执行任务的任务池，用于确定性的测试
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediatePool;

impl TaskPool for ImmediatePool {
    fn dispatch(&self, job: Job) -> PendingTask {
        job();
        PendingTask::completed()
    }
}
