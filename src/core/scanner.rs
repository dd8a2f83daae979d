use crate::core::inventory::{normalize_path, FileMeta, Inventory};
use anyhow::Result;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// 文件扫描器
///
/// 递归遍历一个根目录，产出 相对路径 -> 元数据 的清单。
/// 上一轮的清单仅作为哈希计算的优化输入：大小和修改时间都没变的
/// 文件直接沿用旧校验和，不再读取内容。
pub struct FileScanner;

impl FileScanner {
    pub fn new() -> Self {
        Self
    }

    /// 扫描目录树并返回清单
    ///
    /// 根目录不存在不是错误（首次同步前副本就是这个状态），
    /// 记一条警告并返回空清单。
    pub async fn scan(&self, root: &Path, previous: Option<&Inventory>) -> Result<Inventory> {
        if !root.exists() {
            warn!("扫描根目录不存在，按空清单处理: {}", root.display());
            return Ok(HashMap::new());
        }

        let root_buf = root.to_path_buf();
        let previous = previous.cloned();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let inventory =
            tokio::task::spawn_blocking(move || Self::walk_tree(&root_buf, previous.as_ref()))
                .await?;

        info!(
            "扫描完成: {} ({} 个条目)",
            root.display(),
            inventory.len()
        );

        Ok(inventory)
    }

    /// 深度优先遍历，单个条目的失败只记日志，不中断整个扫描
    fn walk_tree(root: &Path, previous: Option<&Inventory>) -> Inventory {
        let mut inventory = HashMap::new();
        let mut hashed = 0usize;
        let mut reused = 0usize;

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("遍历条目失败，跳过: {}", e);
                    continue;
                }
            };

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("读取元数据失败，跳过: {} - {}", entry.path().display(), e);
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(root) {
                Ok(p) => p.to_string_lossy().to_string(),
                Err(_) => continue,
            };

            // 跳过根目录本身
            if relative.is_empty() {
                continue;
            }

            let relative = normalize_path(&relative);
            let mtime = Self::unix_mtime(&metadata);

            if metadata.is_dir() {
                // 只有空目录需要标记条目，有内容的目录由其中的文件间接体现
                if Self::dir_is_empty(entry.path()) {
                    let marker = format!("{}/", relative);
                    inventory.insert(
                        marker.clone(),
                        FileMeta {
                            path: marker,
                            size: 0,
                            modified_time: mtime,
                            checksum: None,
                        },
                    );
                }
                continue;
            }

            if !metadata.is_file() {
                debug!("跳过非常规文件: {}", relative);
                continue;
            }

            let size = metadata.len();

            // 大小和修改时间都没变时沿用上一轮的校验和
            let checksum = match previous.and_then(|p| p.get(&relative)) {
                Some(prev)
                    if prev.size == size
                        && prev.modified_time == mtime
                        && prev.checksum.is_some() =>
                {
                    reused += 1;
                    prev.checksum.clone()
                }
                _ => {
                    hashed += 1;
                    Some(Self::hash_file(entry.path()))
                }
            };

            inventory.insert(
                relative.clone(),
                FileMeta {
                    path: relative,
                    size,
                    modified_time: mtime,
                    checksum,
                },
            );
        }

        debug!(
            "哈希统计: {} 个重新计算, {} 个沿用缓存",
            hashed, reused
        );

        inventory
    }

    fn unix_mtime(metadata: &std::fs::Metadata) -> i64 {
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }

    /// 流式计算文件校验和
    ///
    /// 读取失败不会中断扫描：返回一个保证与任何合法摘要都不同的
    /// 替代值，下一轮读取成功后比较器自然会把文件当作已变化处理。
    fn hash_file(path: &Path) -> String {
        match Self::try_hash_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                error!("计算校验和失败: {} - {}", path.display(), e);
                Self::fallback_checksum()
            }
        }
    }

    fn try_hash_file(path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut file, &mut hasher)?;
        // 取前 32 个十六进制字符（128 位），足够检测变化
        Ok(hasher.finalize().to_hex()[..32].to_string())
    }

    fn fallback_checksum() -> String {
        format!(
            "unreadable-{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}
