use crate::config::SyncSettings;
use crate::core::comparator::FileComparator;
use crate::core::executor::OperationExecutor;
use crate::core::inventory::Inventory;
use crate::core::scanner::FileScanner;
use crate::core::snapshot::InventorySnapshot;
use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 单轮同步报告
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub files_scanned: usize,
    pub operations_total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

/// 同步引擎 - 串起一轮 扫描 -> 比较 -> 执行 -> 留存状态
///
/// 轮与轮之间由外部调度器串行驱动，上一轮的清单只归引擎所有，
/// 不需要任何跨轮加锁。
pub struct SyncEngine {
    settings: SyncSettings,
    scanner: FileScanner,
    comparator: FileComparator,
    executor: OperationExecutor,
    snapshot: InventorySnapshot,
    previous_source: Option<Inventory>,
    previous_replica: Option<Inventory>,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings, cancelled: Arc<AtomicBool>) -> Self {
        let snapshot = InventorySnapshot::beside_replica(&settings.replica);

        // 进程重启后从磁盘快照恢复上一轮清单，免去整树重新哈希
        let (previous_source, previous_replica) = match snapshot.load(&settings.fingerprint()) {
            Some((source, replica)) => (Some(source), Some(replica)),
            None => (None, None),
        };

        let executor = OperationExecutor::new(settings.source.clone(), settings.replica.clone());

        Self {
            settings,
            scanner: FileScanner::new(),
            comparator: FileComparator::new(),
            executor,
            snapshot,
            previous_source,
            previous_replica,
            cancelled,
        }
    }

    /// 请求停止；进行中的操作会被允许做完
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 执行一轮同步
    ///
    /// 扫描或比较阶段的失败以 Err 返回，由调用方记日志并等待
    /// 下一轮调度重试；单个操作的失败只计入报告，不中断本轮。
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        let start = Instant::now();

        info!(
            "开始同步: {} -> {}",
            self.settings.source.display(),
            self.settings.replica.display()
        );

        let source_inv = self
            .scanner
            .scan(&self.settings.source, self.previous_source.as_ref())
            .await?;
        let replica_inv = self
            .scanner
            .scan(&self.settings.replica, self.previous_replica.as_ref())
            .await?;

        let files_scanned = source_inv.len() + replica_inv.len();

        let operations = self.comparator.reconcile(&source_inv, &replica_inv);

        if operations.is_empty() {
            info!("未检测到变更");
            self.persist_state(source_inv, replica_inv);
            return Ok(PassReport {
                files_scanned,
                operations_total: 0,
                succeeded: 0,
                failed: 0,
                bytes_copied: 0,
                duration_ms: start.elapsed().as_millis() as u64,
                errors: Vec::new(),
            });
        }

        debug!("比较完成: {} 个操作待执行", operations.len());

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut bytes_copied = 0u64;
        let mut errors = Vec::new();

        for operation in &operations {
            if self.is_cancelled() {
                warn!("收到停止请求，本轮提前结束");
                break;
            }

            // 每个操作成功或失败都恰好记一条日志
            match self.executor.execute(operation).await {
                Ok(bytes) => {
                    succeeded += 1;
                    bytes_copied += bytes;
                    info!("{} 完成: {}", operation.kind(), operation.path());
                }
                Err(e) => {
                    failed += 1;
                    error!("{} 失败: {} - {}", operation.kind(), operation.path(), e);
                    errors.push(e.to_string());
                }
            }
        }

        // 副本清单留存的是执行前的扫描结果。复制过的文件时间戳已改为
        // 源文件时间戳，与旧条目对不上，下一轮必然重新哈希，所以
        // 单个操作失败不会让缓存和副本实际内容脱节。
        self.persist_state(source_inv, replica_inv);

        let report = PassReport {
            files_scanned,
            operations_total: operations.len(),
            succeeded,
            failed,
            bytes_copied,
            duration_ms: start.elapsed().as_millis() as u64,
            errors,
        };

        info!(
            "本轮同步结束: {} 个操作, 成功 {}, 失败 {}, 复制 {} 字节",
            report.operations_total, report.succeeded, report.failed, report.bytes_copied
        );

        Ok(report)
    }

    /// 留存本轮清单供下一轮复用哈希，并写入磁盘快照
    fn persist_state(&mut self, source: Inventory, replica: Inventory) {
        if let Err(e) = self
            .snapshot
            .save(&self.settings.fingerprint(), &source, &replica)
        {
            warn!("保存清单快照失败: {}", e);
        }

        self.previous_source = Some(source);
        self.previous_replica = Some(replica);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn settings(source: &Path, replica: &Path) -> SyncSettings {
        SyncSettings {
            source: source.to_path_buf(),
            replica: replica.to_path_buf(),
            interval_secs: 1,
            log_path: source.with_file_name("test.log"),
        }
    }

    fn engine(source: &Path, replica: &Path) -> SyncEngine {
        SyncEngine::new(
            settings(source, replica),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_first_pass_mirrors_source_then_reaches_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), b"hello sync").unwrap();
        fs::write(source.join("sub/b.txt"), b"nested").unwrap();

        let mut engine = engine(&source, &replica);

        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.operations_total, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(fs::read(replica.join("a.txt")).unwrap(), b"hello sync");
        assert_eq!(fs::read(replica.join("sub/b.txt")).unwrap(), b"nested");

        // 时间戳跟随源文件
        let src_mtime = filetime::FileTime::from_last_modification_time(
            &fs::metadata(source.join("a.txt")).unwrap(),
        );
        let rep_mtime = filetime::FileTime::from_last_modification_time(
            &fs::metadata(replica.join("a.txt")).unwrap(),
        );
        assert_eq!(src_mtime.unix_seconds(), rep_mtime.unix_seconds());

        // 一轮成功后到达不动点：再跑一轮不产生任何操作
        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.operations_total, 0);
    }

    #[tokio::test]
    async fn test_content_change_yields_single_update() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), b"version one").unwrap();

        let mut engine = engine(&source, &replica);
        engine.run_pass().await.unwrap();

        fs::write(source.join("a.txt"), b"version two is longer").unwrap();

        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.operations_total, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(
            fs::read(replica.join("a.txt")).unwrap(),
            b"version two is longer"
        );
    }

    #[tokio::test]
    async fn test_source_removal_deletes_and_prunes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("keep.txt"), b"keep").unwrap();
        fs::write(source.join("sub/b.txt"), b"bye").unwrap();

        let mut engine = engine(&source, &replica);
        engine.run_pass().await.unwrap();
        assert!(replica.join("sub/b.txt").exists());

        fs::remove_file(source.join("sub/b.txt")).unwrap();
        fs::remove_dir(source.join("sub")).unwrap();

        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.failed, 0);
        // b.txt 是 sub 里最后一个条目，目录一并清掉
        assert!(!replica.join("sub").exists());
        assert!(replica.join("keep.txt").exists());
        assert!(replica.exists());
    }

    #[tokio::test]
    async fn test_empty_directory_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir_all(source.join("emptydir")).unwrap();

        let mut engine = engine(&source, &replica);
        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.operations_total, 1);
        assert!(replica.join("emptydir").is_dir());
        assert_eq!(fs::read_dir(replica.join("emptydir")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_identical_trees_produce_no_operations() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&replica).unwrap();
        fs::write(source.join("a.txt"), b"same").unwrap();
        fs::copy(source.join("a.txt"), replica.join("a.txt")).unwrap();

        let mut engine = engine(&source, &replica);
        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.operations_total, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_missing_source_file_counts_as_failure_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), b"aaa").unwrap();
        fs::write(source.join("b.txt"), b"bbb").unwrap();

        let mut engine = engine(&source, &replica);

        // 扫描后、执行前抽走一个源文件，模拟复制时源消失
        let source_inv = engine
            .scanner
            .scan(&source, None)
            .await
            .unwrap();
        assert_eq!(source_inv.len(), 2);
        fs::remove_file(source.join("a.txt")).unwrap();

        // 引擎自己会重扫，这里直接手工走一遍执行路径
        let replica_inv = engine.scanner.scan(&replica, None).await.unwrap();
        let operations = engine.comparator.reconcile(&source_inv, &replica_inv);
        assert_eq!(operations.len(), 2);

        let mut failed = 0;
        let mut succeeded = 0;
        for op in &operations {
            match engine.executor.execute(op).await {
                Ok(_) => succeeded += 1,
                Err(_) => failed += 1,
            }
        }

        assert_eq!(failed, 1);
        assert_eq!(succeeded, 1);
        assert!(replica.join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_snapshot_restores_previous_inventories() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let replica = dir.path().join("replica");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), b"persist me").unwrap();

        {
            let mut engine = engine(&source, &replica);
            engine.run_pass().await.unwrap();
        }

        // 新引擎（模拟进程重启）应能从快照加载上一轮清单
        let restored = SyncEngine::new(
            settings(&source, &replica),
            Arc::new(AtomicBool::new(false)),
        );
        let previous = restored.previous_source.as_ref().unwrap();
        assert!(previous.contains_key("a.txt"));
        assert!(previous["a.txt"].checksum.is_some());
    }
}
