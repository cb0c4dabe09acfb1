//! # 应用状态
//!
//! 进程内所有长期存活的状态都由 `AppState` 显式持有：在 `setup` 中创建，
//! 通过 Tauri managed state 注入各个 command，在应用退出时拆除。
//!
//! ## 生命周期
//! 1. `new` - 构建日志存储、主题协调器、门面与事件总线
//! 2. `start` - 读取本地主题偏好，注册两个推送订阅（日志、账号列表）
//! 3. 后台任务 - 后端对账、主题信号监听、主题渲染转发、推送事件泵
//! 4. `shutdown` - 通知后台任务退出，释放全部推送订阅

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::models::log_entry::LogEntry;
use crate::models::settings::PanelConfig;
use crate::services::backend::{Backend, HttpBackend};
use crate::services::event_bus::{EventBus, Subscription, TOPIC_ACCOUNTS_UPDATE, TOPIC_SYSTEM_LOG};
use crate::services::facade::Facade;
use crate::services::log_buffer::{IngestOutcome, LogStore};
use crate::services::preference::PreferenceStore;
use crate::services::sse;
use crate::services::theme::{ThemeCoordinator, ThemeSignalBus};
use crate::services::ui_bridge::{self, UiBridge, EVENT_LOGS_CHANGED, EVENT_THEME_CHANGED};

/// 桌面端使用的应用状态
pub type DesktopState = AppState<HttpBackend>;

/// 新日志事件负载
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogChange {
    entry: LogEntry,
    outcome: IngestOutcome,
}

pub struct AppState<B: Backend> {
    pub logs: Arc<LogStore>,
    pub facade: Arc<Facade<B>>,
    pub theme: Arc<ThemeCoordinator>,
    pub theme_signals: Arc<ThemeSignalBus>,
    pub events: Arc<EventBus>,
    bridge: Arc<dyn UiBridge>,
    subscriptions: Mutex<Vec<Subscription>>,
    shutdown: watch::Sender<bool>,
    settings: PanelConfig,
}

impl<B: Backend> AppState<B> {
    pub fn new(
        backend: Arc<B>,
        bridge: Arc<dyn UiBridge>,
        store: Arc<dyn PreferenceStore>,
        settings: PanelConfig,
    ) -> Self {
        let logs = Arc::new(LogStore::new(settings.default_clear_log_threshold));
        let theme_signals = Arc::new(ThemeSignalBus::new());
        let theme = Arc::new(ThemeCoordinator::new(store, theme_signals.clone()));
        let facade = Arc::new(Facade::new(
            backend,
            bridge.clone(),
            logs.clone(),
            theme.clone(),
            settings.clone(),
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            logs,
            facade,
            theme,
            theme_signals,
            events: Arc::new(EventBus::new()),
            bridge,
            subscriptions: Mutex::new(Vec::new()),
            shutdown,
            settings,
        }
    }

    pub fn settings(&self) -> &PanelConfig {
        &self.settings
    }

    /// 读取本地主题偏好并注册推送订阅；重复调用不会重复注册
    pub fn start(&self) {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        if !subscriptions.is_empty() {
            return;
        }

        let mode = self.theme.bootstrap_from_store();
        log::info!("本地主题偏好: {}", mode);

        let logs = self.logs.clone();
        let bridge = self.bridge.clone();
        subscriptions.push(self.events.subscribe(TOPIC_SYSTEM_LOG, move |payload| {
            if let Some((entry, outcome)) = logs.ingest_payload(payload) {
                ui_bridge::render_json(
                    bridge.as_ref(),
                    EVENT_LOGS_CHANGED,
                    &LogChange { entry, outcome },
                );
            }
        }));

        let facade = self.facade.clone();
        subscriptions.push(self.events.subscribe(TOPIC_ACCOUNTS_UPDATE, move |payload| {
            facade.apply_account_push(payload);
        }));

        log::info!(
            "已注册推送订阅：{} {} 个，{} {} 个",
            TOPIC_SYSTEM_LOG,
            self.events.handler_count(TOPIC_SYSTEM_LOG),
            TOPIC_ACCOUNTS_UPDATE,
            self.events.handler_count(TOPIC_ACCOUNTS_UPDATE)
        );
    }

    /// 启动后与后端对账：后端主题覆盖本地偏好，加载日志清空阈值
    pub fn bootstrap(&self) -> impl Future<Output = ()> + Send + 'static {
        let facade = self.facade.clone();
        let theme = self.theme.clone();
        async move {
            theme.reconcile_with_backend(facade.backend().as_ref()).await;
            // 失败已由门面汇报，沿用默认阈值
            let _ = facade.load_log_threshold().await;
        }
    }

    /// 主题信号监听任务
    pub fn theme_listener(&self) -> impl Future<Output = ()> + Send + 'static {
        let theme = self.theme.clone();
        let signals = self.theme_signals.subscribe();
        let shutdown = self.shutdown.subscribe();
        async move { theme.listen(signals, shutdown).await }
    }

    /// 把主题快照转发给渲染树
    pub fn theme_forwarder(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut view = self.theme.subscribe_view();
        let mut shutdown = self.shutdown.subscribe();
        let bridge = self.bridge.clone();
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    changed = view.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = view.borrow_and_update().clone();
                        ui_bridge::render_json(bridge.as_ref(), EVENT_THEME_CHANGED, &snapshot);
                    }
                }
            }
        }
    }

    /// 拆除：通知后台任务退出并释放全部推送订阅
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let released: Vec<Subscription> = self
            .subscriptions
            .lock()
            .map(|mut subscriptions| subscriptions.drain(..).collect())
            .unwrap_or_default();
        let count = released.len();
        for subscription in released {
            subscription.release();
        }
        self.facade.unmount_accounts();
        self.facade.unmount_plugins();
        log::info!("应用状态已拆除，释放 {} 个推送订阅", count);
    }
}

impl AppState<HttpBackend> {
    /// 推送事件泵：连接后端事件流并发布到事件总线
    pub fn event_pump(&self) -> impl Future<Output = ()> + Send + 'static {
        let backend = self.facade.backend().clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.subscribe();
        let max_backoff = Duration::from_secs(self.settings.event_reconnect_max_secs);
        async move {
            match backend.events_url() {
                Ok(url) => sse::pump_events(backend.client(), url, events, shutdown, max_backoff).await,
                Err(e) => log::error!("无法启动推送事件泵: {}", e),
            }
        }
    }
}
