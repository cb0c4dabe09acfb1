//! # 业务逻辑服务模块
//!
//! 包含实时状态同步层的核心逻辑，与 Tauri command 层解耦：
//! - `normalizer` - 推送负载规范化：把多种包装形状统一为规范值
//! - `log_buffer` - 有界日志缓冲区：达到阈值整体清空，最新在前
//! - `reconciler` - 账号 / 插件列表对账：拉取与推送整体替换，拒绝过期结果
//! - `theme` - 主题协调：信号总线与实际主题推导
//! - `preference` - 本地偏好存储（主题偏好）
//! - `facade` - 命令 / 查询门面：统一成功 / 失败汇报
//! - `backend` - 后端契约及其 HTTP 实现
//! - `event_bus` / `sse` - 推送主题分发与 SSE 事件泵
//! - `ui_bridge` - 向 webview 推送状态变化与提示
//! - `panel_config` - 控制台设置加载
//! - `app_state` - 显式持有的应用状态及其生命周期

pub mod app_state;
pub mod backend;
pub mod event_bus;
pub mod facade;
pub mod log_buffer;
pub mod normalizer;
pub mod panel_config;
pub mod preference;
pub mod reconciler;
pub mod sse;
pub mod theme;
pub mod ui_bridge;
