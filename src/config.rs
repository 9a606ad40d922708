//! 同步目录配置

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认的目录配置文件
pub const DIRECTORIES_FILE: &str = "bi-directories.txt";

/// 覆盖目录配置文件路径的环境变量
pub const DIRECTORIES_ENV: &str = "BISYNC_DIRECTORIES";

/// 配置错误，出现时整个程序在同步开始前退出
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("未找到目录配置文件 '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("读取目录配置文件 '{}' 失败: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("目录配置文件 '{}' 至少需要两行（两个需要同步的目录），实际只有 {found} 行", .path.display())]
    TooFewLines { path: PathBuf, found: usize },
}

/// 需要保持同步的两个根目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPair {
    pub dir_a: PathBuf,
    pub dir_b: PathBuf,
}

impl RootPair {
    /// 从配置文件读取：第一行是目录 A，第二行是目录 B
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        Self::parse(&content, path)
    }

    /// 解析配置内容，忽略 BOM、首尾空白和空行
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

        match (lines.next(), lines.next()) {
            (Some(a), Some(b)) => Ok(Self {
                dir_a: PathBuf::from(a),
                dir_b: PathBuf::from(b),
            }),
            (first, _) => Err(ConfigError::TooFewLines {
                path: path.to_path_buf(),
                found: usize::from(first.is_some()),
            }),
        }
    }
}

/// 目录配置文件路径，环境变量优先
pub fn directories_file() -> PathBuf {
    std::env::var_os(DIRECTORIES_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DIRECTORIES_FILE))
}
