//! 同步配置模块

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 同步配置（进程生命周期内不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// 源目录
    pub source: PathBuf,
    /// 副本目录
    pub replica: PathBuf,
    /// 同步间隔（秒）
    pub interval_secs: u64,
    /// 日志文件路径
    pub log_path: PathBuf,
}

impl SyncSettings {
    /// 校验配置
    ///
    /// 核心组件假定拿到的配置已通过这里；校验失败是唯一的
    /// 致命错误，同步开始后不再有任何会终止进程的路径。
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("同步间隔必须大于 0 秒");
        }

        if !self.source.is_dir() {
            bail!("源目录不存在或不是目录: {}", self.source.display());
        }

        let source = self
            .source
            .canonicalize()
            .with_context(|| format!("无法解析源目录: {}", self.source.display()))?;

        // 副本允许尚不存在（首次同步前的正常状态）
        if self.replica.exists() {
            let replica = self
                .replica
                .canonicalize()
                .with_context(|| format!("无法解析副本目录: {}", self.replica.display()))?;

            if source == replica {
                bail!("源目录和副本目录不能相同");
            }
            if replica.starts_with(&source) || source.starts_with(&replica) {
                bail!("源目录和副本目录不能互相嵌套");
            }
        } else if self.replica.starts_with(&self.source) || self.source.starts_with(&self.replica)
        {
            bail!("源目录和副本目录不能互相嵌套");
        }

        Ok(())
    }

    /// 配置指纹，清单快照用它判断配置是否变化
    pub fn fingerprint(&self) -> String {
        format!("{}|{}", self.source.display(), self.replica.display())
    }
}
