use crate::core::comparator::SyncOperation;
use crate::core::inventory::resolve_path;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// 单个操作的执行错误
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("复制 {path} 失败: {source}")]
    Copy {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("删除 {path} 失败: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("创建目录 {path} 失败: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("删除目录 {path} 失败: {source}")]
    DeleteDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 操作执行器 - 把比较器产出的操作落到文件系统上
///
/// 操作按产出顺序逐个执行；单个操作失败不影响后续操作，
/// 由协调器统计失败数。
pub struct OperationExecutor {
    source_root: PathBuf,
    replica_root: PathBuf,
}

impl OperationExecutor {
    pub fn new(source_root: impl Into<PathBuf>, replica_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
        }
    }

    /// 执行单个操作，返回复制的字节数（非复制操作为 0）
    pub async fn execute(&self, operation: &SyncOperation) -> Result<u64, ExecuteError> {
        match operation {
            SyncOperation::Create { path, .. } | SyncOperation::Update { path, .. } => {
                self.copy_file(path).await
            }
            SyncOperation::Delete { path } => {
                self.delete_file(path).await?;
                Ok(0)
            }
            SyncOperation::CreateDir { path } => {
                self.create_dir(path).await?;
                Ok(0)
            }
            SyncOperation::DeleteDir { path } => {
                self.delete_dir(path).await?;
                Ok(0)
            }
        }
    }

    async fn copy_file(&self, path: &str) -> Result<u64, ExecuteError> {
        let src = resolve_path(&self.source_root, path);
        let dst = resolve_path(&self.replica_root, path);

        self.copy_impl(&src, &dst)
            .await
            .map_err(|e| ExecuteError::Copy {
                path: path.to_string(),
                source: e,
            })
    }

    async fn copy_impl(&self, src: &Path, dst: &Path) -> std::io::Result<u64> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 临时文件写入后原子重命名，避免留下半截文件
        let tmp_name = match dst.file_name() {
            Some(name) => format!("{}.tmp", name.to_string_lossy()),
            None => ".tmp".to_string(),
        };
        let tmp = dst.with_file_name(tmp_name);

        let bytes = fs::copy(src, &tmp).await?;
        fs::rename(&tmp, dst).await?;

        // 副本时间戳跟随源文件当前的修改时间
        let src_meta = fs::metadata(src).await?;
        if let Ok(modified) = src_meta.modified() {
            let mtime = filetime::FileTime::from_system_time(modified);
            filetime::set_file_times(dst, mtime, mtime)?;
        }

        debug!("复制完成: {} ({} 字节)", dst.display(), bytes);
        Ok(bytes)
    }

    async fn delete_file(&self, path: &str) -> Result<(), ExecuteError> {
        let dst = resolve_path(&self.replica_root, path);

        match fs::remove_file(&dst).await {
            Ok(()) => {}
            // 目标已不存在，删除是幂等的
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("删除目标已不存在: {}", path);
            }
            Err(e) => {
                return Err(ExecuteError::Delete {
                    path: path.to_string(),
                    source: e,
                })
            }
        }

        self.prune_empty_parents(&dst).await;
        Ok(())
    }

    /// 自下而上清理删空的父目录，攀升到副本根（不含）为止
    ///
    /// 目录非空或出现任何错误（比如被并发删除）时终止攀升，
    /// 不算操作失败。
    async fn prune_empty_parents(&self, deleted: &Path) {
        let mut current = deleted.parent().map(Path::to_path_buf);

        while let Some(dir) = current {
            if dir == self.replica_root || !dir.starts_with(&self.replica_root) {
                break;
            }

            match Self::dir_is_empty(&dir).await {
                Ok(true) => {
                    if let Err(e) = fs::remove_dir(&dir).await {
                        debug!("清理空目录中断: {} - {}", dir.display(), e);
                        break;
                    }
                    debug!("已清理空目录: {}", dir.display());
                }
                _ => break,
            }

            current = dir.parent().map(Path::to_path_buf);
        }
    }

    async fn dir_is_empty(path: &Path) -> std::io::Result<bool> {
        let mut entries = fs::read_dir(path).await?;
        Ok(entries.next_entry().await?.is_none())
    }

    async fn create_dir(&self, path: &str) -> Result<(), ExecuteError> {
        let dst = resolve_path(&self.replica_root, path);

        fs::create_dir_all(&dst)
            .await
            .map_err(|e| ExecuteError::CreateDir {
                path: path.to_string(),
                source: e,
            })
    }

    async fn delete_dir(&self, path: &str) -> Result<(), ExecuteError> {
        let dst = resolve_path(&self.replica_root, path);

        match fs::metadata(&dst).await {
            // 目标已不存在，幂等成功
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(ExecuteError::DeleteDir {
                    path: path.to_string(),
                    source: e,
                })
            }
            Ok(_) => {}
        }

        // 标记产生时目录是空的；执行到这里如果又有了内容
        // （本轮刚复制进去的文件，或并发写入），目录不能删
        match Self::dir_is_empty(&dst).await {
            Ok(false) => {
                warn!("目录已非空，跳过删除: {}", path);
                return Ok(());
            }
            Ok(true) => {}
            Err(e) => {
                return Err(ExecuteError::DeleteDir {
                    path: path.to_string(),
                    source: e,
                })
            }
        }

        fs::remove_dir_all(&dst)
            .await
            .map_err(|e| ExecuteError::DeleteDir {
                path: path.to_string(),
                source: e,
            })
    }
}
