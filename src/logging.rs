//! 日志模块 - 文件日志写入与大小轮转

use anyhow::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// 单个日志文件的大小上限（超过后轮转为 .old）
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// 解析日志级别字符串，无法识别时回落到 info
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// 初始化日志：文件层（带大小轮转）加控制台层
pub fn init(log_path: &Path, level: &str) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(parse_level(level).into());

    let file_writer = SizeRotatingWriter::new(log_path, MAX_LOG_SIZE)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false);

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(())
}

/// 带大小限制的日志写入器
///
/// 超过上限时把当前文件改名为 `<name>.old`（旧备份被覆盖），
/// 再从头写新文件。
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl SizeRotatingWriter {
    pub fn new(file_path: &Path, max_size: u64) -> io::Result<Self> {
        let writer = Self::open_file(file_path, max_size)?;

        Ok(Self {
            file_path: file_path.to_path_buf(),
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
        // 现有文件已超限就先轮转
        if let Ok(metadata) = fs::metadata(file_path) {
            if metadata.len() > max_size {
                Self::rotate(file_path)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(BufWriter::new(file))
    }

    fn rotate(file_path: &Path) -> io::Result<()> {
        let backup = file_path.with_extension("log.old");

        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(file_path, &backup)?;

        Ok(())
    }
}

/// 实际写入句柄，每次写入后检查是否需要轮转
pub struct LogWriter {
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap();

        let Some(writer) = guard.as_mut() else {
            return Err(io::Error::other("日志写入器不可用"));
        };

        let written = writer.write(buf)?;
        writer.flush()?;

        if let Ok(metadata) = fs::metadata(&self.file_path) {
            if metadata.len() > self.max_size {
                if let Some(mut old) = guard.take() {
                    let _ = old.flush();
                }

                let _ = SizeRotatingWriter::rotate(&self.file_path);

                if let Ok(new_writer) =
                    SizeRotatingWriter::open_file(&self.file_path, self.max_size)
                {
                    *guard = Some(new_writer);
                }
            }
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        match guard.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("WARN"), tracing::Level::WARN);
        assert_eq!(parse_level("nonsense"), tracing::Level::INFO);
    }

    #[test]
    fn test_writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        let writer = SizeRotatingWriter::new(&path, 1024).unwrap();
        let mut handle = writer.make_writer();
        handle.write_all(b"first line\n").unwrap();
        handle.write_all(b"second line\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first line"));
        assert!(content.contains("second line"));
    }

    #[test]
    fn test_rotation_on_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        // 上限 32 字节，两次写入必然触发轮转
        let writer = SizeRotatingWriter::new(&path, 32).unwrap();
        let mut handle = writer.make_writer();
        handle.write_all(&[b'x'; 64]).unwrap();
        handle.write_all(b"after rotate\n").unwrap();

        assert!(path.with_extension("log.old").exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("after rotate"));
    }
}
