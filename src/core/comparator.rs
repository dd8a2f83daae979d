use crate::core::inventory::{FileMeta, Inventory};

/// 同步操作
#[derive(Debug, Clone)]
pub enum SyncOperation {
    /// 源新增文件，复制到副本
    Create { path: String, meta: FileMeta },
    /// 两边都有但内容不同，用源覆盖副本
    Update {
        path: String,
        old: FileMeta,
        new: FileMeta,
    },
    /// 副本多余文件，删除
    Delete { path: String },
    /// 源有空目录，在副本创建
    CreateDir { path: String },
    /// 副本多余空目录，删除
    DeleteDir { path: String },
}

impl SyncOperation {
    /// 操作对应的相对路径
    pub fn path(&self) -> &str {
        match self {
            SyncOperation::Create { path, .. }
            | SyncOperation::Update { path, .. }
            | SyncOperation::Delete { path }
            | SyncOperation::CreateDir { path }
            | SyncOperation::DeleteDir { path } => path,
        }
    }

    /// 操作类型名（用于日志）
    pub fn kind(&self) -> &'static str {
        match self {
            SyncOperation::Create { .. } => "create",
            SyncOperation::Update { .. } => "update",
            SyncOperation::Delete { .. } => "delete",
            SyncOperation::CreateDir { .. } => "create_dir",
            SyncOperation::DeleteDir { .. } => "delete_dir",
        }
    }
}

/// 文件比较器 - 对比两份清单，产出最小操作集
pub struct FileComparator;

impl FileComparator {
    pub fn new() -> Self {
        Self
    }

    /// 判断两个文件内容是否不同
    ///
    /// 两边都有校验和时以校验和为准（时间戳不同不算变化）；
    /// 任一边缺校验和则退回比较大小和修改时间。
    fn differs(&self, source: &FileMeta, replica: &FileMeta) -> bool {
        if let (Some(src_sum), Some(rep_sum)) = (&source.checksum, &replica.checksum) {
            if !src_sum.is_empty() && !rep_sum.is_empty() {
                return src_sum != rep_sum;
            }
        }

        source.size != replica.size || source.modified_time != replica.modified_time
    }

    /// 对比源和副本清单，返回有序操作列表
    ///
    /// 先按路径序输出源侧的创建/更新，再输出副本侧的删除。
    /// 输出是确定性的，但不按目录深度排序，执行器需要自行保证
    /// 父目录先于文件存在。
    pub fn reconcile(&self, source: &Inventory, replica: &Inventory) -> Vec<SyncOperation> {
        let mut operations = Vec::new();

        let mut source_paths: Vec<&String> = source.keys().collect();
        source_paths.sort();

        for path in source_paths {
            let src = &source[path];

            match replica.get(path) {
                None => {
                    if src.is_dir_marker() {
                        operations.push(SyncOperation::CreateDir {
                            path: path.trim_end_matches('/').to_string(),
                        });
                    } else {
                        operations.push(SyncOperation::Create {
                            path: path.clone(),
                            meta: src.clone(),
                        });
                    }
                }
                Some(rep) => {
                    // 空目录标记两边都有，无事可做
                    if src.is_dir_marker() {
                        continue;
                    }

                    if self.differs(src, rep) {
                        operations.push(SyncOperation::Update {
                            path: path.clone(),
                            old: rep.clone(),
                            new: src.clone(),
                        });
                    }
                }
            }
        }

        let mut replica_paths: Vec<&String> = replica.keys().collect();
        replica_paths.sort();

        for path in replica_paths {
            if source.contains_key(path) {
                continue;
            }

            if replica[path].is_dir_marker() {
                operations.push(SyncOperation::DeleteDir {
                    path: path.trim_end_matches('/').to_string(),
                });
            } else {
                operations.push(SyncOperation::Delete { path: path.clone() });
            }
        }

        operations
    }
}

impl Default for FileComparator {
    fn default() -> Self {
        Self::new()
    }
}
