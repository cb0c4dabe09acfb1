//! # 有界日志缓冲区
//!
//! 保存推送通道送达的日志，最新的在最前。容量由 `clearLogThreshold` 控制
//! （后端配置，默认 500，取值范围 100 ~ 500）。
//!
//! ## 溢出清空策略
//! 新日志到达时若缓冲区长度已达到阈值，则丢弃全部旧日志，只保留这条新日志；
//! 这不是逐条淘汰最旧记录的滑动窗口。处理完每条日志后始终满足
//! `len ≤ threshold`。
//!
//! ## 线程安全
//! `LogStore` 用 `RwLock` 包装缓冲区，整个"读长度 → 清空或插入"过程在同一把写锁内完成，
//! 两条几乎同时到达的日志总能看到一致的旧长度，后到的一条不会被误清空。

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde_json::Value;

use crate::models::log_entry::LogEntry;
use crate::services::normalizer;

/// 单次写入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IngestOutcome {
    /// 新日志插入到最前，`len` 为插入后的长度
    Prepended { len: usize },
    /// 达到阈值，清空了 `discarded` 条旧日志后只保留新日志
    Flushed { discarded: usize },
}

/// 日志缓冲区（非线程安全的内核）
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    threshold: usize,
}

impl LogBuffer {
    /// 创建空缓冲区；阈值至少为 1，否则无法满足 `len ≤ threshold`
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            threshold: threshold.max(1),
        }
    }

    /// 写入一条日志
    pub fn ingest(&mut self, entry: LogEntry) -> IngestOutcome {
        if self.entries.len() >= self.threshold {
            let discarded = self.entries.len();
            self.entries.clear();
            self.entries.push_front(entry);
            IngestOutcome::Flushed { discarded }
        } else {
            self.entries.push_front(entry);
            IngestOutcome::Prepended {
                len: self.entries.len(),
            }
        }
    }

    /// 修改阈值，从下一次写入开始生效，不回溯裁剪已有日志
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold.max(1);
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按最新在前的顺序迭代
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 日志缓冲区快照（IPC 返回数据）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    pub entries: Vec<LogEntry>,
    pub threshold: usize,
}

/// 进程级日志存储
///
/// 生命周期与应用进程一致，由 `AppState` 持有并在启动时注册推送订阅。
pub struct LogStore {
    buffer: RwLock<LogBuffer>,
}

impl LogStore {
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: RwLock::new(LogBuffer::new(threshold)),
        }
    }

    /// 原子地写入一条日志
    pub fn ingest(&self, entry: LogEntry) -> IngestOutcome {
        let mut buffer = self.write();
        let outcome = buffer.ingest(entry);
        if let IngestOutcome::Flushed { discarded } = outcome {
            log::info!("日志数量达到阈值 {}，已清空 {} 条旧日志", buffer.threshold(), discarded);
        }
        outcome
    }

    /// 规范化推送负载并写入
    ///
    /// # 返回值
    /// 负载无法识别时返回 `None`（该事件被丢弃）
    pub fn ingest_payload(&self, payload: &Value) -> Option<(LogEntry, IngestOutcome)> {
        let entry: LogEntry = normalizer::normalize_single(payload)?;
        let outcome = self.ingest(entry.clone());
        Some((entry, outcome))
    }

    pub fn set_threshold(&self, threshold: usize) {
        self.write().set_threshold(threshold);
    }

    pub fn threshold(&self) -> usize {
        self.read().threshold()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        let buffer = self.read();
        LogSnapshot {
            entries: buffer.iter().cloned().collect(),
            threshold: buffer.threshold(),
        }
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    // 持锁方 panic 不影响缓冲区本身的一致性，中毒后继续使用
    fn read(&self) -> RwLockReadGuard<'_, LogBuffer> {
        self.buffer.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogBuffer> {
        self.buffer.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(buffer: &LogBuffer) -> Vec<String> {
        buffer.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn flushes_instead_of_sliding() {
        let mut buffer = LogBuffer::new(3);
        for m in ["A", "B", "C", "D"] {
            buffer.ingest(LogEntry::sample(m));
        }
        assert_eq!(messages(&buffer), ["D"]);

        buffer.ingest(LogEntry::sample("E"));
        assert_eq!(messages(&buffer), ["E", "D"]);
    }

    #[test]
    fn length_follows_flush_property() {
        for threshold in [1usize, 3, 7] {
            for n in 1..=4 * threshold {
                let mut buffer = LogBuffer::new(threshold);
                for i in 0..n {
                    buffer.ingest(LogEntry::sample(&i.to_string()));
                    assert!(buffer.len() <= threshold);
                }
                let expected = match n % threshold {
                    0 => threshold,
                    rem => rem,
                };
                assert_eq!(buffer.len(), expected, "threshold={threshold} n={n}");
                assert_eq!(buffer.iter().next().unwrap().message, (n - 1).to_string());
            }
        }
    }

    #[test]
    fn hundred_threshold_with_hundred_fifty_events() {
        let store = LogStore::new(100);
        for i in 1..=150 {
            store.ingest(LogEntry::sample(&i.to_string()));
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.entries.len(), 50);
        let expected: Vec<String> = (101..=150).rev().map(|i| i.to_string()).collect();
        let actual: Vec<String> = snapshot.entries.iter().map(|e| e.message.clone()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn flush_reports_discarded_count() {
        let mut buffer = LogBuffer::new(2);
        assert_eq!(buffer.ingest(LogEntry::sample("a")), IngestOutcome::Prepended { len: 1 });
        assert_eq!(buffer.ingest(LogEntry::sample("b")), IngestOutcome::Prepended { len: 2 });
        assert_eq!(buffer.ingest(LogEntry::sample("c")), IngestOutcome::Flushed { discarded: 2 });
    }

    #[test]
    fn threshold_change_applies_on_next_ingest_only() {
        let store = LogStore::new(500);
        for i in 0..10 {
            store.ingest(LogEntry::sample(&i.to_string()));
        }

        store.set_threshold(5);
        assert_eq!(store.len(), 10, "not trimmed retroactively");

        let outcome = store.ingest(LogEntry::sample("next"));
        assert_eq!(outcome, IngestOutcome::Flushed { discarded: 10 });
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let mut buffer = LogBuffer::new(0);
        buffer.ingest(LogEntry::sample("a"));
        buffer.ingest(LogEntry::sample("b"));
        assert_eq!(messages(&buffer), ["b"]);
    }

    #[test]
    fn concurrent_ingest_never_loses_entries() {
        let store = LogStore::new(500);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..50 {
                        store.ingest(LogEntry::sample(&format!("{t}-{i}")));
                    }
                });
            }
        });
        assert_eq!(store.len(), 400);
    }

    #[test]
    fn poisoned_lock_still_accepts_threshold_and_clear() {
        let store = LogStore::new(500);
        store.ingest(LogEntry::sample("a"));

        let crashed = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = store.buffer.write().unwrap();
                    panic!("持锁时崩溃");
                })
                .join()
        });
        assert!(crashed.is_err());
        assert!(store.buffer.is_poisoned());

        store.set_threshold(200);
        assert_eq!(store.threshold(), 200);
        store.clear();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn payload_ingest_drops_malformed_events() {
        let store = LogStore::new(10);

        assert!(store.ingest_payload(&json!({ "foo": "bar" })).is_none());
        let (entry, outcome) = store
            .ingest_payload(&json!({ "data": [{ "timeStamp": "t", "msg": "hi", "type": "私聊" }] }))
            .unwrap();

        assert_eq!(entry.message, "hi");
        assert_eq!(outcome, IngestOutcome::Prepended { len: 1 });
        assert_eq!(store.len(), 1);
    }
}
