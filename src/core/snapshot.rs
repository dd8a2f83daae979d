//! 清单快照
//!
//! 把上一轮的两份清单持久化到副本根旁边，
//! 进程重启后可以继续沿用旧校验和，免去整树重新哈希。

use crate::core::inventory::Inventory;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// 快照文件内容
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// 上一轮的源清单
    pub source: Inventory,
    /// 上一轮的副本清单（执行前的扫描结果）
    pub replica: Inventory,
    /// 写入时间（Unix 时间戳）
    pub cached_at: u64,
    /// 同步配置指纹（配置变了快照就作废）
    pub config_hash: String,
}

/// 清单快照管理器
pub struct InventorySnapshot {
    path: PathBuf,
}

impl InventorySnapshot {
    /// 快照放在副本根旁边的同级隐藏文件里，不会混进副本树被扫描到
    pub fn beside_replica(replica_root: &Path) -> Self {
        let name = replica_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "replica".to_string());

        let path = match replica_root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.join(format!(".{}.syncstate.json", name))
            }
            _ => replica_root.join(".syncstate.json"),
        };

        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 计算配置指纹
    fn hash_config(config: &str) -> String {
        let hash = blake3::hash(config.as_bytes());
        hash.to_hex()[..16].to_string()
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }

    /// 加载快照，返回 (源清单, 副本清单)
    ///
    /// 快照损坏或配置指纹不匹配时直接删除并返回 None。
    pub fn load(&self, config_fingerprint: &str) -> Option<(Inventory, Inventory)> {
        if !self.path.exists() {
            return None;
        }

        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(_) => return None,
        };

        let entry: SnapshotEntry = match serde_json::from_slice(&data) {
            Ok(e) => e,
            Err(_) => {
                // 快照损坏，删除
                debug!("快照损坏，删除: {}", self.path.display());
                let _ = std::fs::remove_file(&self.path);
                return None;
            }
        };

        if entry.config_hash != Self::hash_config(config_fingerprint) {
            info!("快照配置不匹配，作废");
            let _ = std::fs::remove_file(&self.path);
            return None;
        }

        info!(
            "加载清单快照: 源 {} 条, 副本 {} 条 (缓存于 {} 秒前)",
            entry.source.len(),
            entry.replica.len(),
            Self::now().saturating_sub(entry.cached_at)
        );

        Some((entry.source, entry.replica))
    }

    /// 保存快照
    pub fn save(
        &self,
        config_fingerprint: &str,
        source: &Inventory,
        replica: &Inventory,
    ) -> Result<()> {
        let entry = SnapshotEntry {
            source: source.clone(),
            replica: replica.clone(),
            cached_at: Self::now(),
            config_hash: Self::hash_config(config_fingerprint),
        };

        let data = serde_json::to_vec(&entry)?;
        std::fs::write(&self.path, data)?;

        debug!(
            "已保存清单快照: {} (源 {} 条, 副本 {} 条)",
            self.path.display(),
            source.len(),
            replica.len()
        );

        Ok(())
    }

    /// 清除快照
    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
