//! 同步事件与日志接收端

use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

/// 事件内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEventKind {
    /// 文件已复制
    FileCopied {
        source: PathBuf,
        destination: PathBuf,
    },
    /// 目录已合并复制
    DirectoryCopied {
        source: PathBuf,
        destination: PathBuf,
    },
    /// 创建了缺失的目标目录
    DirectoryCreated { path: PathBuf },
    /// 单个复制任务失败
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        reason: String,
    },
    /// 整个目录对（及其子树）同步失败
    PairFailed {
        dir_a: PathBuf,
        dir_b: PathBuf,
        reason: String,
    },
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEventKind::FileCopied { destination, .. } => {
                write!(f, "文件已复制: '{}'", destination.display())
            }
            SyncEventKind::DirectoryCopied { destination, .. } => {
                write!(f, "目录已复制: '{}'", destination.display())
            }
            SyncEventKind::DirectoryCreated { path } => {
                write!(f, "已创建目录 '{}'", path.display())
            }
            SyncEventKind::CopyFailed {
                source,
                destination,
                reason,
            } => write!(
                f,
                "复制 '{}' 到 '{}' 失败: {}",
                source.display(),
                destination.display(),
                reason
            ),
            SyncEventKind::PairFailed { reason, .. } => write!(f, "{}", reason),
        }
    }
}

/// 带时间戳的同步事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub at: DateTime<Local>,
    pub kind: SyncEventKind,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind) -> Self {
        Self {
            at: Local::now(),
            kind,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            SyncEventKind::CopyFailed { .. } | SyncEventKind::PairFailed { .. }
        )
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.at.format("%Y-%m-%d %H:%M:%S%.3f"), self.kind)
    }
}

/// 日志接收端，必须可以被多个工作线程同时调用
pub trait LogSink: Send + Sync {
    fn record(&self, event: SyncEvent);
}

/// 把事件写入 tracing，由全局 subscriber 负责落盘和控制台输出
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, event: SyncEvent) {
        if event.is_failure() {
            error!("{}", event.kind);
        } else {
            info!("{}", event.kind);
        }
    }
}

/// 在内存中保存事件，主要用于测试
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 统计满足条件的事件数
    pub fn count(&self, predicate: impl Fn(&SyncEventKind) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(&e.kind))
            .count()
    }
}

impl LogSink for MemorySink {
    fn record(&self, event: SyncEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
