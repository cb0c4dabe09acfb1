//! # 设置与主题 Tauri Commands
//!
//! 提供框架配置草稿与主题的 command 处理函数：
//! - `load_config` / `refresh_config` - 拉取完整配置并重置草稿
//! - `get_config_draft` / `edit_config` - 读取与逐字段修改草稿
//! - `detect_wechat_paths` - 由后端探测微信目录并填入草稿
//! - `save_config` - 校验并提交整条配置
//! - `get_theme` / `set_theme` - 主题查询与切换
//! - `report_storage_change` / `report_os_theme` - 界面侧主题信号上报
//! - `get_panel_config` - 控制台自身设置

use tauri::State;

use crate::models::config::{ConfigEdit, WechatConfig};
use crate::models::settings::PanelConfig;
use crate::models::theme::{ThemeMode, ThemeSnapshot};
use crate::services::app_state::DesktopState;
use crate::services::facade::DraftState;

#[tauri::command]
pub async fn get_panel_config(state: State<'_, DesktopState>) -> Result<PanelConfig, String> {
    Ok(state.settings().clone())
}

/// 拉取完整配置，未保存的草稿修改被丢弃
#[tauri::command]
pub async fn load_config(state: State<'_, DesktopState>) -> Result<WechatConfig, String> {
    state.facade.load_config().await
}

/// 刷新配置（带成功提示）
#[tauri::command]
pub async fn refresh_config(state: State<'_, DesktopState>) -> Result<WechatConfig, String> {
    state.facade.refresh_config().await
}

#[tauri::command]
pub async fn get_config_draft(
    state: State<'_, DesktopState>,
) -> Result<Option<DraftState>, String> {
    Ok(state.facade.draft_state())
}

/// 修改草稿中的一个字段
///
/// # 参数
/// - `edit` - 形如 `{ "field": "clearLog", "value": 300 }` 的编辑指令
///
/// # 错误
/// 配置尚未加载或取值越界时返回错误，草稿保持不变
#[tauri::command]
pub async fn edit_config(
    edit: ConfigEdit,
    state: State<'_, DesktopState>,
) -> Result<WechatConfig, String> {
    state.facade.edit_config(edit)
}

#[tauri::command]
pub async fn detect_wechat_paths(state: State<'_, DesktopState>) -> Result<WechatConfig, String> {
    state.facade.detect_wechat_paths().await
}

/// 保存草稿
///
/// # 错误
/// 任一字段越界、后端调用失败或后端拒绝时返回错误
#[tauri::command]
pub async fn save_config(state: State<'_, DesktopState>) -> Result<(), String> {
    state.facade.save_config().await
}

#[tauri::command]
pub async fn get_theme(state: State<'_, DesktopState>) -> Result<ThemeSnapshot, String> {
    Ok(state.theme.snapshot())
}

/// 切换主题：后端确认后才写入本地偏好并广播
#[tauri::command]
pub async fn set_theme(
    mode: ThemeMode,
    state: State<'_, DesktopState>,
) -> Result<ThemeSnapshot, String> {
    state.facade.set_theme(mode).await
}

/// 上报其它窗口对偏好存储的修改（webview 的 storage 事件）
///
/// # 返回值
/// 是否为有效的主题信号
#[tauri::command]
pub async fn report_storage_change(
    key: String,
    new_value: Option<String>,
    state: State<'_, DesktopState>,
) -> Result<bool, String> {
    Ok(state
        .theme_signals
        .persisted_store_changed(&key, new_value.as_deref()))
}

/// 上报系统配色偏好（webview 的 prefers-color-scheme 变化）
#[tauri::command]
pub async fn report_os_theme(dark: bool, state: State<'_, DesktopState>) -> Result<(), String> {
    state.theme_signals.os_preference_changed(dark);
    Ok(())
}
