//! # 主题协调
//!
//! 主题模式有四个互不协调的来源：
//! 1. 启动时读取的本地持久化偏好
//! 2. 同进程内的切换广播
//! 3. 其它窗口写入偏好存储时的跨界面信号
//! 4. 系统配色偏好变化（只影响"跟随系统"模式下的渲染结果）
//!
//! 所有来源都经过内部信号总线 `ThemeSignalBus`，由 `ThemeCoordinator` 统一消费，
//! 推导出实际主题并通过 `watch` 通道推送给渲染树。
//!
//! ## 切换顺序
//! `set_theme` 先请求后端，后端确认后才写本地偏好、更新内存状态并广播；
//! 任何一步失败都保持原状态。本地写入失败时会把后端回滚到旧模式，
//! 保证后端、本地偏好与内存状态三者一致。

use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, watch, Mutex};

use crate::models::theme::{EffectiveTheme, ThemeMode, ThemeSnapshot};
use crate::services::backend::Backend;
use crate::services::preference::{PreferenceStore, THEME_KEY};

/// 主题信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeSignal {
    /// 偏好存储被其它界面修改
    PersistedChanged(ThemeMode),
    /// 同进程内的切换广播
    LocalChange(ThemeMode),
    /// 系统配色偏好变化
    OsPreferenceChanged { dark: bool },
}

/// 主题信号总线，三个具名输入适配器分别对应三类外部来源
pub struct ThemeSignalBus {
    tx: broadcast::Sender<ThemeSignal>,
}

impl ThemeSignalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThemeSignal> {
        self.tx.subscribe()
    }

    /// 偏好存储变更适配器
    ///
    /// 只关心 `theme` 键；空值和无法识别的值被忽略。
    ///
    /// # 返回值
    /// 信号被发布时返回 `true`
    pub fn persisted_store_changed(&self, key: &str, new_value: Option<&str>) -> bool {
        if key != THEME_KEY {
            return false;
        }
        let Some(raw) = new_value.map(str::trim).filter(|v| !v.is_empty()) else {
            return false;
        };
        match raw.parse::<ThemeMode>() {
            Ok(mode) => {
                self.publish(ThemeSignal::PersistedChanged(mode));
                true
            }
            Err(e) => {
                log::warn!("忽略跨界面主题信号: {}", e);
                false
            }
        }
    }

    /// 同进程切换广播适配器
    pub fn local_change_broadcast(&self, mode: ThemeMode) {
        self.publish(ThemeSignal::LocalChange(mode));
    }

    /// 系统配色变化适配器
    pub fn os_preference_changed(&self, dark: bool) {
        self.publish(ThemeSignal::OsPreferenceChanged { dark });
    }

    fn publish(&self, signal: ThemeSignal) {
        // 没有订阅者时发送失败，可以忽略
        let _ = self.tx.send(signal);
    }
}

impl Default for ThemeSignalBus {
    fn default() -> Self {
        Self::new()
    }
}

struct ThemeState {
    mode: ThemeMode,
    os_dark: bool,
    revision: u64,
}

impl ThemeState {
    fn snapshot(&self) -> ThemeSnapshot {
        let effective = self.mode.resolve(self.os_dark);
        ThemeSnapshot {
            mode: self.mode,
            effective,
            background: effective.background_color(),
            revision: self.revision,
        }
    }
}

/// 主题协调器
pub struct ThemeCoordinator {
    state: RwLock<ThemeState>,
    /// 串行化 `set_theme` 与后端对账，避免两次切换交错写入后端和本地偏好
    transition: Mutex<()>,
    store: Arc<dyn PreferenceStore>,
    bus: Arc<ThemeSignalBus>,
    view: watch::Sender<ThemeSnapshot>,
}

impl ThemeCoordinator {
    pub fn new(store: Arc<dyn PreferenceStore>, bus: Arc<ThemeSignalBus>) -> Self {
        let state = ThemeState {
            mode: ThemeMode::default(),
            os_dark: false,
            revision: 0,
        };
        let (view, _) = watch::channel(state.snapshot());
        Self {
            state: RwLock::new(state),
            transition: Mutex::new(()),
            store,
            bus,
            view,
        }
    }

    /// 启动时读取本地持久化偏好；缺失或无法识别时保持默认的亮色
    pub fn bootstrap_from_store(&self) -> ThemeMode {
        match self.store.get(THEME_KEY) {
            Some(raw) => match raw.parse::<ThemeMode>() {
                Ok(mode) => {
                    self.update(|state| state.mode = mode);
                }
                Err(e) => log::warn!("本地主题偏好无效，使用默认值: {}", e),
            },
            None => log::debug!("本地没有主题偏好，使用默认值"),
        }
        self.mode()
    }

    /// 写入当前的系统配色偏好（窗口创建时读取一次）
    pub fn seed_os_preference(&self, dark: bool) {
        self.update(|state| state.os_dark = dark);
    }

    /// 启动时以后端主题为准，覆盖本地偏好
    ///
    /// 读取失败时保留本地值，只记录警告。
    pub async fn reconcile_with_backend<B: Backend>(&self, backend: &B) {
        let _guard = self.transition.lock().await;

        let remote = match backend.get_theme().await {
            Ok(mode) => mode,
            Err(e) => {
                log::warn!("获取后端主题失败，沿用本地偏好: {}", e);
                return;
            }
        };

        if remote == self.mode() {
            return;
        }

        log::info!("后端主题 {} 与本地 {} 不一致，以后端为准", remote, self.mode());
        if let Err(e) = self.store.set(THEME_KEY, remote.as_str()) {
            log::warn!("同步本地主题偏好失败: {}", e);
        }
        self.update(|state| state.mode = remote);
    }

    /// 切换主题模式
    ///
    /// # 返回值
    /// 成功时返回新的主题快照
    ///
    /// # 错误
    /// 后端调用失败、后端未确认或本地偏好写入失败时返回错误，内存状态保持不变
    pub async fn set_theme<B: Backend>(
        &self,
        backend: &B,
        mode: ThemeMode,
    ) -> Result<ThemeSnapshot, String> {
        let _guard = self.transition.lock().await;
        let previous = self.mode();

        match backend.set_theme(mode).await {
            Ok(true) => {}
            Ok(false) => return Err("后端未确认主题切换".to_string()),
            Err(e) => return Err(e),
        }

        if let Err(e) = self.store.set(THEME_KEY, mode.as_str()) {
            log::error!("主题偏好写入失败，回滚后端主题到 {}: {}", previous, e);
            match backend.set_theme(previous).await {
                Ok(true) => {}
                Ok(false) => log::error!("回滚后端主题未被确认"),
                Err(rollback) => log::error!("回滚后端主题失败: {}", rollback),
            }
            return Err(e);
        }

        self.update(|state| state.mode = mode);
        self.bus.local_change_broadcast(mode);
        Ok(self.snapshot())
    }

    /// 处理一个主题信号
    ///
    /// # 返回值
    /// 渲染结果需要刷新时返回 `true`
    pub fn handle_signal(&self, signal: ThemeSignal) -> bool {
        match signal {
            ThemeSignal::PersistedChanged(mode) | ThemeSignal::LocalChange(mode) => {
                self.update(|state| state.mode = mode)
            }
            ThemeSignal::OsPreferenceChanged { dark } => self.update(|state| state.os_dark = dark),
        }
    }

    /// 持续消费信号总线，直到收到关闭信号或总线关闭
    pub async fn listen(
        &self,
        mut signals: broadcast::Receiver<ThemeSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = signals.recv() => match received {
                    Ok(signal) => {
                        if self.handle_signal(signal) {
                            log::debug!("主题信号 {:?} 触发重新渲染", signal);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("主题信号积压，跳过 {} 条", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        log::debug!("主题信号监听已停止");
    }

    pub fn mode(&self) -> ThemeMode {
        self.read_state().mode
    }

    /// 实际渲染主题，每次调用实时推导
    pub fn effective(&self) -> EffectiveTheme {
        let state = self.read_state();
        state.mode.resolve(state.os_dark)
    }

    pub fn snapshot(&self) -> ThemeSnapshot {
        self.read_state().snapshot()
    }

    /// 订阅渲染树需要的主题快照
    pub fn subscribe_view(&self) -> watch::Receiver<ThemeSnapshot> {
        self.view.subscribe()
    }

    /// 在写锁内修改状态；模式或实际主题发生变化时递增版本并推送快照
    fn update(&self, mutate: impl FnOnce(&mut ThemeState)) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let before = (state.mode, state.mode.resolve(state.os_dark));
        mutate(&mut state);
        let after = (state.mode, state.mode.resolve(state.os_dark));
        if before == after {
            return false;
        }

        state.revision += 1;
        self.view.send_replace(state.snapshot());
        true
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ThemeState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}
