//! # 账号 / 插件列表对账
//!
//! 每种实体只维护一份权威列表，来源有两个互不协调的通道：
//! - **拉取**：挂载时或显式刷新时主动查询后端
//! - **推送**：长期订阅，后端随时可能送达一份完整的替换列表
//!
//! 两个来源从不逐条合并，任何一次被接受的结果都整体替换工作列表。
//!
//! ## 过期结果的处理
//! 拉取在发起时领取一个单调递增的序号（`PullTicket`），推送在送达时领取序号。
//! 在 `RejectStale` 策略下，序号早于当前已应用版本的拉取结果被丢弃，
//! 避免一个慢返回的初始查询覆盖更新鲜的推送列表。
//! `LastWriteWins` 策略则按回调执行顺序，最后执行的写入生效。
//!
//! 视图卸载（`unmount`）会让当前所有在途拉取失效：它们返回时什么都不做。

use std::sync::Mutex;

use serde::Serialize;

use crate::models::settings::ReconcilePolicy;

/// 列表加载阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadPhase {
    /// 尚未挂载，或已卸载
    Idle,
    /// 挂载后首个结果尚未到达
    Loading,
    /// 已有结果（可能为空列表）
    Loaded,
}

/// 一次拉取的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullTicket {
    epoch: u64,
    seq: u64,
}

/// 对账后的列表快照（IPC 返回数据）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledList<T> {
    pub items: Vec<T>,
    pub phase: LoadPhase,
    /// 每次列表被替换时递增
    pub revision: u64,
}

struct Inner<T> {
    items: Vec<T>,
    phase: LoadPhase,
    /// 视图代次：每次挂载/卸载递增，旧代次的拉取结果一律忽略
    epoch: u64,
    /// 已发放的最大序号
    issued_seq: u64,
    /// 当前列表对应的序号
    applied_seq: u64,
    revision: u64,
}

impl<T> Inner<T> {
    fn next_seq(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    fn replace(&mut self, items: Vec<T>, seq: u64) {
        self.items = items;
        self.applied_seq = seq;
        self.revision += 1;
    }
}

/// 单实体类型的对账器
pub struct Reconciler<T> {
    label: &'static str,
    policy: ReconcilePolicy,
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Reconciler<T> {
    /// 创建对账器
    ///
    /// # 参数
    /// - `label` - 实体名称，仅用于日志
    /// - `policy` - 拉取与推送竞争时的处理策略
    pub fn new(label: &'static str, policy: ReconcilePolicy) -> Self {
        Self {
            label,
            policy,
            inner: Mutex::new(Inner {
                items: Vec::new(),
                phase: LoadPhase::Idle,
                epoch: 0,
                issued_seq: 0,
                applied_seq: 0,
                revision: 0,
            }),
        }
    }

    /// 视图挂载：开启新代次，清空列表并进入加载中，返回首次拉取的凭据
    pub fn mount(&self) -> PullTicket {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.items.clear();
        inner.phase = LoadPhase::Loading;
        inner.revision += 1;
        let seq = inner.next_seq();
        PullTicket {
            epoch: inner.epoch,
            seq,
        }
    }

    /// 视图卸载：让在途拉取全部失效，保留当前列表供推送继续更新
    pub fn unmount(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.phase = LoadPhase::Idle;
    }

    /// 在当前代次内发起一次刷新拉取
    pub fn begin_pull(&self) -> PullTicket {
        let mut inner = self.lock();
        let seq = inner.next_seq();
        PullTicket {
            epoch: inner.epoch,
            seq,
        }
    }

    /// 拉取成功返回
    ///
    /// # 返回值
    /// 结果被接受并替换了列表时返回 `true`；凭据已失效或已过期时返回 `false`
    pub fn complete_pull(&self, ticket: PullTicket, items: Vec<T>) -> bool {
        let mut inner = self.lock();

        if ticket.epoch != inner.epoch {
            log::debug!("{}拉取结果返回时视图已卸载，忽略", self.label);
            return false;
        }

        let seq = match self.policy {
            ReconcilePolicy::RejectStale => {
                if ticket.seq < inner.applied_seq {
                    log::info!(
                        "丢弃过期的{}拉取结果（序号 {} < 已应用 {}）",
                        self.label,
                        ticket.seq,
                        inner.applied_seq
                    );
                    return false;
                }
                ticket.seq
            }
            ReconcilePolicy::LastWriteWins => inner.next_seq(),
        };

        inner.replace(items, seq);
        inner.phase = LoadPhase::Loaded;
        true
    }

    /// 拉取失败返回：结束加载状态，列表保持原样（挂载后即为空列表）
    pub fn fail_pull(&self, ticket: PullTicket) {
        let mut inner = self.lock();
        if ticket.epoch == inner.epoch && inner.phase == LoadPhase::Loading {
            inner.phase = LoadPhase::Loaded;
            inner.revision += 1;
        }
    }

    /// 推送送达：总是整体替换列表；视图未挂载时保持 `Idle`
    pub fn apply_push(&self, items: Vec<T>) {
        let mut inner = self.lock();
        let seq = inner.next_seq();
        inner.replace(items, seq);
        if inner.phase != LoadPhase::Idle {
            inner.phase = LoadPhase::Loaded;
        }
    }

    pub fn snapshot(&self) -> ReconciledList<T> {
        let inner = self.lock();
        ReconciledList {
            items: inner.items.clone(),
            phase: inner.phase,
            revision: inner.revision,
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconciler(policy: ReconcilePolicy) -> Reconciler<&'static str> {
        Reconciler::new("测试", policy)
    }

    #[test]
    fn mount_then_pull_assigns_directly() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        let ticket = r.mount();
        assert_eq!(r.snapshot().phase, LoadPhase::Loading);

        assert!(r.complete_pull(ticket, vec!["a", "b"]));
        let snapshot = r.snapshot();
        assert_eq!(snapshot.items, ["a", "b"]);
        assert_eq!(snapshot.phase, LoadPhase::Loaded);
    }

    #[test]
    fn failed_mount_pull_is_loaded_empty() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        let ticket = r.mount();
        r.fail_pull(ticket);

        let snapshot = r.snapshot();
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.phase, LoadPhase::Loaded);
    }

    #[test]
    fn last_write_wins_follows_callback_order() {
        // 拉取先返回、推送后到：推送生效
        let r = reconciler(ReconcilePolicy::LastWriteWins);
        let ticket = r.mount();
        r.complete_pull(ticket, vec!["L1"]);
        r.apply_push(vec!["L2"]);
        assert_eq!(r.items(), ["L2"]);

        // 推送先到、拉取后返回：拉取生效
        let r = reconciler(ReconcilePolicy::LastWriteWins);
        let ticket = r.mount();
        r.apply_push(vec!["L2"]);
        assert!(r.complete_pull(ticket, vec!["L1"]));
        assert_eq!(r.items(), ["L1"]);
    }

    #[test]
    fn reject_stale_keeps_fresher_push() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        let ticket = r.mount();
        r.apply_push(vec!["pushed"]);

        assert!(!r.complete_pull(ticket, vec!["slow pull"]));
        assert_eq!(r.items(), ["pushed"]);
    }

    #[test]
    fn reject_stale_accepts_pull_issued_after_push() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        let first = r.mount();
        r.complete_pull(first, vec!["a"]);
        r.apply_push(vec!["b"]);

        let refresh = r.begin_pull();
        assert!(r.complete_pull(refresh, vec!["c"]));
        assert_eq!(r.items(), ["c"]);
    }

    #[test]
    fn pulls_completing_after_unmount_are_no_ops() {
        let r = reconciler(ReconcilePolicy::LastWriteWins);
        let ticket = r.mount();
        r.apply_push(vec!["pushed"]);
        r.unmount();

        assert!(!r.complete_pull(ticket, vec!["late"]));
        r.fail_pull(ticket);
        let snapshot = r.snapshot();
        assert_eq!(snapshot.items, ["pushed"]);
        assert_eq!(snapshot.phase, LoadPhase::Idle);
    }

    #[test]
    fn push_while_unmounted_keeps_idle() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        r.apply_push(vec!["before mount"]);
        assert_eq!(r.snapshot().phase, LoadPhase::Idle);

        r.mount();
        r.apply_push(vec!["mounted"]);
        assert_eq!(r.snapshot().phase, LoadPhase::Loaded);

        r.unmount();
        r.apply_push(vec!["after unmount"]);
        let snapshot = r.snapshot();
        assert_eq!(snapshot.items, ["after unmount"]);
        assert_eq!(snapshot.phase, LoadPhase::Idle);
    }

    #[test]
    fn remount_discards_previous_generation() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        let old = r.mount();
        let fresh = r.mount();

        assert!(!r.complete_pull(old, vec!["old"]));
        assert!(r.complete_pull(fresh, vec!["new"]));
        assert_eq!(r.items(), ["new"]);
    }

    #[test]
    fn revision_bumps_on_every_replacement() {
        let r = reconciler(ReconcilePolicy::RejectStale);
        let before = r.snapshot().revision;
        r.apply_push(vec!["a"]);
        r.apply_push(vec!["a"]);
        assert_eq!(r.snapshot().revision, before + 2);
    }
}
