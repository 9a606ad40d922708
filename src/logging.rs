//! 日志模块 - 提供日志配置、带大小限制的日志文件和本地时间格式

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// 可选的日志配置文件
pub const SETTINGS_FILE: &str = "bi-sync.json";

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB），0 表示不限制
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志文件名
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_name() -> String {
    "bi-sync.log".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
            file_name: default_file_name(),
        }
    }
}

impl LogConfig {
    /// 从 `dir` 下的配置文件加载日志配置，读取失败时使用默认值
    pub fn load(dir: &Path) -> Self {
        let config_file = dir.join(SETTINGS_FILE);
        if let Ok(content) = fs::read_to_string(&config_file) {
            if let Ok(config) = serde_json::from_str::<serde_json::Value>(&content) {
                if let Some(log_config) = config.get("log") {
                    if let Ok(log) = serde_json::from_value::<LogConfig>(log_config.clone()) {
                        return log;
                    }
                }
            }
        }
        Self::default()
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    /// 日志文件路径
    pub fn log_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    /// 运行结束时的提示；日志被禁用或文件没有打开时不提示
    pub fn exit_hint(&self, file_opened: bool, log_path: &Path) -> Option<String> {
        (self.enabled && file_opened).then(|| format!("详细信息请查看 '{}'", log_path.display()))
    }
}

/// 带大小限制的日志文件
///
/// 超过上限时把当前文件重命名为 `<name>.old`（覆盖旧备份），然后重新开始写。
/// 由 `tracing_appender::non_blocking` 的后台线程独占写入，每次写入都是完整的一行。
pub struct RotatingLogFile {
    path: PathBuf,
    max_size: u64,
    written: u64,
    file: File,
}

impl RotatingLogFile {
    pub fn open(path: &Path, max_size_mb: u32) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let max_size = u64::from(max_size_mb) * 1024 * 1024;
        let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if max_size > 0 && existing > max_size {
            Self::rotate_file(path)?;
        }

        let file = Self::open_append(path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            max_size,
            written,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 备份文件路径
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".old");
        PathBuf::from(name)
    }

    fn open_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn rotate_file(path: &Path) -> io::Result<()> {
        let backup = Self::backup_path(path);
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(path, &backup)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        Self::rotate_file(&self.path)?;
        self.file = Self::open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_size > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// 使用本地时间的时间戳格式
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        use std::fmt::Write as _;
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_without_file() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(LogConfig::load(temp.path()), LogConfig::default());
    }

    #[test]
    fn test_load_partial_log_section() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join(SETTINGS_FILE),
            r#"{ "log": { "level": "debug", "maxSizeMb": 1 } }"#,
        )
        .unwrap();

        let config = LogConfig::load(temp.path());

        assert_eq!(config.level, "debug");
        assert_eq!(config.max_size_mb, 1);
        assert!(config.enabled);
        assert_eq!(config.file_name, "bi-sync.log");
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(SETTINGS_FILE), "{ not json").unwrap();

        assert_eq!(LogConfig::load(temp.path()), LogConfig::default());
    }

    #[test]
    fn test_exit_hint_only_when_log_file_written() {
        let path = Path::new("bi-sync.log");
        let enabled = LogConfig::default();
        let disabled = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };

        assert_eq!(
            enabled.exit_hint(true, path).as_deref(),
            Some("详细信息请查看 'bi-sync.log'")
        );
        assert_eq!(enabled.exit_hint(false, path), None);
        assert_eq!(disabled.exit_hint(true, path), None);
        assert_eq!(disabled.exit_hint(false, path), None);
    }

    #[test]
    fn test_unknown_level_maps_to_info() {
        let config = LogConfig {
            level: "verbose".into(),
            ..LogConfig::default()
        };
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_rotates_when_limit_exceeded() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bi-sync.log");
        let mut log = RotatingLogFile::open(&path, 1).unwrap();
        let line = vec![b'x'; 700 * 1024];

        log.write_all(&line).unwrap();
        log.write_all(&line).unwrap();
        log.flush().unwrap();

        let backup = RotatingLogFile::backup_path(&path);
        assert_eq!(fs::metadata(&backup).unwrap().len(), 700 * 1024);
        assert_eq!(fs::metadata(&path).unwrap().len(), 700 * 1024);
    }

    #[test]
    fn test_oversized_file_rotated_on_open() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bi-sync.log");
        fs::write(&path, vec![b'y'; 2 * 1024 * 1024]).unwrap();

        let log = RotatingLogFile::open(&path, 1).unwrap();

        assert_eq!(log.path(), path.as_path());
        assert!(RotatingLogFile::backup_path(&path).exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_appends_to_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bi-sync.log");
        fs::write(&path, "first\n").unwrap();

        let mut log = RotatingLogFile::open(&path, 5).unwrap();
        log.write_all("第二行\n".as_bytes()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n第二行\n");
    }
}
