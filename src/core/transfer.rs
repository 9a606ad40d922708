//! 复制动作 - 单个文件覆盖复制，或目录合并复制

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// 一次复制：源路径 -> 目标路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// 复制结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// 复制了单个文件
    File { bytes: u64 },
    /// 合并复制了整个目录
    Directory { files: u64, bytes: u64 },
}

/// 复制失败
///
/// 目录合并复制时 `cause` 是第一个失败条目的错误，`failed_entries` 是失败条目总数。
#[derive(Debug, Error)]
#[error("复制 '{}' 到 '{}' 失败: {}", .source_path.display(), .destination.display(), .cause)]
pub struct CopyError {
    pub source_path: PathBuf,
    pub destination: PathBuf,
    #[source]
    pub cause: io::Error,
    pub failed_entries: usize,
}

impl CopyError {
    /// 失败原因，多个条目失败时附带数量
    pub fn reason(&self) -> String {
        if self.failed_entries > 1 {
            format!("{} (共 {} 个条目失败)", self.cause, self.failed_entries)
        } else {
            self.cause.to_string()
        }
    }
}

impl CopyTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// 执行复制
    ///
    /// 源是目录时做合并复制：创建目标树，新增或覆盖文件，从不删除目标中多余的条目。
    /// 源是文件时覆盖目标文件，并尽量保留修改时间和权限。
    pub fn run(&self) -> Result<CopyOutcome, CopyError> {
        let metadata = fs::metadata(&self.source).map_err(|e| self.error(e))?;

        if metadata.is_dir() {
            self.merge_directory()
        } else {
            let bytes = copy_file(&self.source, &self.destination).map_err(|e| self.error(e))?;
            Ok(CopyOutcome::File { bytes })
        }
    }

    /// 合并复制目录；单个条目失败不会中断遍历，其余条目照常复制
    fn merge_directory(&self) -> Result<CopyOutcome, CopyError> {
        fs::create_dir_all(&self.destination).map_err(|e| self.error(e))?;

        let mut files = 0;
        let mut bytes = 0;
        let mut failures: Vec<io::Error> = Vec::new();

        // 跟随符号链接复制其指向的内容；悬空链接和链接成环由 walkdir 报告为错误
        for entry in WalkDir::new(&self.source).follow_links(true).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("跳过无法访问的条目: {}", e);
                    failures.push(e.into());
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(&self.source) else {
                continue;
            };
            let target = self.destination.join(relative);

            let result = if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
            } else {
                copy_file(entry.path(), &target).map(|n| {
                    bytes += n;
                    files += 1;
                })
            };
            if let Err(e) = result {
                warn!("复制 '{}' 失败: {}", entry.path().display(), e);
                failures.push(e);
            }
        }

        let failed_entries = failures.len();
        match failures.into_iter().next() {
            None => Ok(CopyOutcome::Directory { files, bytes }),
            Some(cause) => Err(CopyError {
                failed_entries,
                ..self.error(cause)
            }),
        }
    }

    fn error(&self, cause: io::Error) -> CopyError {
        CopyError {
            source_path: self.source.clone(),
            destination: self.destination.clone(),
            cause,
            failed_entries: 1,
        }
    }
}

/// 覆盖复制单个文件并保留时间戳（权限由 `fs::copy` 一并复制）
///
/// 先写入目标目录下的临时文件再原子重命名，读取目标的并发任务只会看到完整的旧内容或新内容。
fn copy_file(source: &Path, destination: &Path) -> io::Result<u64> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".bisync-")
        .suffix(".tmp")
        .tempfile_in(parent)?;

    let bytes = fs::copy(source, temp.path())?;

    let metadata = fs::metadata(source)?;
    let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
    let accessed = metadata.accessed().unwrap_or(modified);
    filetime::set_file_times(
        temp.path(),
        filetime::FileTime::from_system_time(accessed),
        filetime::FileTime::from_system_time(modified),
    )?;

    temp.persist(destination).map_err(|e| e.error)?;
    Ok(bytes)
}
