//! 文件清单 - 一次扫描得到的 相对路径 -> 元数据 快照

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 文件元数据
///
/// 空目录用带尾部 `/` 的路径表示（大小为 0，无校验和），
/// 否则文件型清单里无内容的目录不会留下任何痕迹。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// 相对路径，统一使用 `/` 分隔符
    pub path: String,
    pub size: u64,
    /// 修改时间（Unix 秒，UTC）
    pub modified_time: i64,
    /// 内容校验和，None 表示尚未计算
    pub checksum: Option<String>,
}

impl FileMeta {
    /// 是否是空目录标记
    pub fn is_dir_marker(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// 一个扫描根在某一时刻的完整快照
pub type Inventory = HashMap<String, FileMeta>;

/// 规范化路径分隔符（统一使用 /）
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// 把相对路径拼回某个根目录下的绝对路径
///
/// 逐段 push，让平台自己决定分隔符；目录标记的尾部 `/` 会被去掉。
pub fn resolve_path(root: &Path, rel: &str) -> PathBuf {
    let mut full = root.to_path_buf();
    for part in rel.trim_end_matches('/').split('/') {
        if !part.is_empty() {
            full.push(part);
        }
    }
    full
}
