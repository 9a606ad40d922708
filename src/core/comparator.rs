use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 单个子项的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildClass {
    /// 只存在于 A 侧
    OnlyInA,
    /// 只存在于 B 侧
    OnlyInB,
    /// 两侧都是目录，需要递归
    CommonDirectory,
    /// 两侧都有但内容不同（或类型不一致）
    ///
    /// 一侧是文件、另一侧是目录时两个方向的复制都必然失败，
    /// 每次运行都会记录为复制失败，这一项永远不会收敛。
    CommonFileDiffers,
}

/// 目录无法读取
#[derive(Debug, Error)]
#[error("无法读取目录 '{}': {}", .path.display(), .source)]
pub struct ComparisonError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// 一层目录的比较结果
///
/// 每个子项名称恰好出现在其中一个列表里；`same_files` 对应两侧相同、无需处理的文件。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub only_in_a: Vec<OsString>,
    pub only_in_b: Vec<OsString>,
    pub common_dirs: Vec<OsString>,
    pub diff_files: Vec<OsString>,
    pub same_files: Vec<OsString>,
}

impl Classification {
    /// 查询某个名称的分类，相同文件返回 `None`
    #[cfg(test)]
    pub(crate) fn class_of(&self, name: impl AsRef<std::ffi::OsStr>) -> Option<ChildClass> {
        let name = name.as_ref();
        let contains = |list: &[OsString]| list.iter().any(|n| n == name);

        if contains(&self.only_in_a) {
            Some(ChildClass::OnlyInA)
        } else if contains(&self.only_in_b) {
            Some(ChildClass::OnlyInB)
        } else if contains(&self.common_dirs) {
            Some(ChildClass::CommonDirectory)
        } else if contains(&self.diff_files) {
            Some(ChildClass::CommonFileDiffers)
        } else {
            None
        }
    }

    /// 是否不需要任何复制动作
    pub fn is_converged(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.diff_files.is_empty()
    }

    /// 本层需要派发的复制任务数（不同文件算两个方向）
    pub fn copy_count(&self) -> usize {
        self.only_in_a.len() + self.only_in_b.len() + self.diff_files.len() * 2
    }

    /// 参与分类的名称总数
    pub fn total(&self) -> usize {
        self.only_in_a.len()
            + self.only_in_b.len()
            + self.common_dirs.len()
            + self.diff_files.len()
            + self.same_files.len()
    }
}

/// 比较配置
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// 修改时间容差
    pub time_tolerance: Duration,
    /// 大小相同但时间不同时，是否逐字节比较内容
    pub content_fallback: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            time_tolerance: Duration::ZERO,
            content_fallback: true,
        }
    }
}

/// 目录比较器，只比较一层，不递归
#[derive(Debug, Clone, Default)]
pub struct DirectoryComparator {
    config: CompareConfig,
}

impl DirectoryComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// 对两个目录的直接子项进行分类
    pub fn compare(&self, dir_a: &Path, dir_b: &Path) -> Result<Classification, ComparisonError> {
        let left = list_names(dir_a)?;
        let mut right = list_names(dir_b)?;
        let mut result = Classification::default();

        for name in left {
            if right.remove(&name) {
                let path_a = dir_a.join(&name);
                let path_b = dir_b.join(&name);
                match self.classify_common(&path_a, &path_b) {
                    Some(ChildClass::CommonDirectory) => result.common_dirs.push(name),
                    Some(_) => result.diff_files.push(name),
                    None => result.same_files.push(name),
                }
            } else {
                result.only_in_a.push(name);
            }
        }
        result.only_in_b.extend(right);

        debug!(
            "比较完成: {} <-> {} (A独有 {}, B独有 {}, 公共目录 {}, 不同 {}, 相同 {})",
            dir_a.display(),
            dir_b.display(),
            result.only_in_a.len(),
            result.only_in_b.len(),
            result.common_dirs.len(),
            result.diff_files.len(),
            result.same_files.len()
        );

        Ok(result)
    }

    /// 两侧同名子项：返回 `None` 表示相同
    fn classify_common(&self, path_a: &Path, path_b: &Path) -> Option<ChildClass> {
        // 跟随符号链接，与复制时的行为一致
        let (meta_a, meta_b) = match (fs::metadata(path_a), fs::metadata(path_b)) {
            (Ok(a), Ok(b)) => (a, b),
            (a, b) => {
                debug!(
                    "无法读取元数据，视为不同: {} ({:?}) / {} ({:?})",
                    path_a.display(),
                    a.err(),
                    path_b.display(),
                    b.err()
                );
                return Some(ChildClass::CommonFileDiffers);
            }
        };

        match (meta_a.is_dir(), meta_b.is_dir()) {
            (true, true) => Some(ChildClass::CommonDirectory),
            (false, false) => {
                if self.files_match(path_a, &meta_a, path_b, &meta_b) {
                    None
                } else {
                    Some(ChildClass::CommonFileDiffers)
                }
            }
            // 一边是文件一边是目录
            _ => Some(ChildClass::CommonFileDiffers),
        }
    }

    /// 先比较大小和修改时间，必要时再比较内容
    fn files_match(&self, path_a: &Path, meta_a: &Metadata, path_b: &Path, meta_b: &Metadata) -> bool {
        if meta_a.len() != meta_b.len() {
            return false;
        }

        if let (Ok(mtime_a), Ok(mtime_b)) = (meta_a.modified(), meta_b.modified()) {
            let diff = mtime_a
                .duration_since(mtime_b)
                .or_else(|_| mtime_b.duration_since(mtime_a))
                .unwrap_or(Duration::MAX);
            if diff <= self.config.time_tolerance {
                return true;
            }
        }

        if !self.config.content_fallback {
            return false;
        }

        match contents_equal(path_a, path_b) {
            Ok(equal) => equal,
            Err(e) => {
                debug!("内容比较失败，视为不同: {}: {}", path_a.display(), e);
                false
            }
        }
    }
}

/// 单层目录比较接口，引擎通过它对每个目录对分类
pub trait LevelComparator: Send + Sync {
    fn compare(&self, dir_a: &Path, dir_b: &Path) -> Result<Classification, ComparisonError>;
}

impl LevelComparator for DirectoryComparator {
    fn compare(&self, dir_a: &Path, dir_b: &Path) -> Result<Classification, ComparisonError> {
        DirectoryComparator::compare(self, dir_a, dir_b)
    }
}

/// 列出目录下的直接子项名称（已排序）
fn list_names(dir: &Path) -> Result<BTreeSet<OsString>, ComparisonError> {
    let to_err = |source| ComparisonError {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir).map_err(to_err)? {
        let entry = entry.map_err(to_err)?;
        names.insert(entry.file_name());
    }
    Ok(names)
}

/// 逐块比较两个文件的内容
fn contents_equal(path_a: &Path, path_b: &Path) -> io::Result<bool> {
    const CHUNK: usize = 8 * 1024;

    let mut reader_a = BufReader::new(File::open(path_a)?);
    let mut reader_b = BufReader::new(File::open(path_b)?);
    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];

    loop {
        let read_a = read_full(&mut reader_a, &mut buf_a)?;
        let read_b = read_full(&mut reader_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// 尽量填满缓冲区，返回实际读取字节数
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
