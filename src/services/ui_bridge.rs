//! # 界面桥接
//!
//! 服务层通过 `UiBridge` 把状态变化和提示消息推送给 webview，
//! 桌面端实现基于 `tauri::Emitter`，测试中使用记录型实现。

use serde::Serialize;
use serde_json::Value;
use tauri::{AppHandle, Emitter, Runtime};

/// 提示消息事件
pub const EVENT_NOTICE: &str = "notice";
/// 新日志写入（负载：`{ entry, outcome }`）
pub const EVENT_LOGS_CHANGED: &str = "logs:changed";
/// 账号列表替换（负载：`ReconciledList<Account>`）
pub const EVENT_ACCOUNTS_CHANGED: &str = "accounts:changed";
/// 插件列表替换（负载：`ReconciledList<Plugin>`）
pub const EVENT_PLUGINS_CHANGED: &str = "plugins:changed";
/// 主题重新渲染（负载：`ThemeSnapshot`）
pub const EVENT_THEME_CHANGED: &str = "theme:changed";

/// 提示级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// 短暂显示的提示消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// 服务层到界面的单向通道
pub trait UiBridge: Send + Sync {
    fn notice(&self, notice: Notice);

    fn render(&self, channel: &str, payload: Value);
}

/// 序列化后推送到界面；序列化失败只记录日志
pub fn render_json<T: Serialize>(bridge: &dyn UiBridge, channel: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => bridge.render(channel, value),
        Err(e) => log::error!("序列化 {} 事件失败: {}", channel, e),
    }
}

/// 基于 Tauri 事件系统的桥接
pub struct TauriBridge<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriBridge<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> UiBridge for TauriBridge<R> {
    fn notice(&self, notice: Notice) {
        if let Err(e) = self.app.emit(EVENT_NOTICE, &notice) {
            log::warn!("发送提示消息失败: {}", e);
        }
    }

    fn render(&self, channel: &str, payload: Value) {
        if let Err(e) = self.app.emit(channel, payload) {
            log::warn!("发送 {} 事件失败: {}", channel, e);
        }
    }
}
