//! # 日志 Tauri Commands
//!
//! 日志只由推送通道写入，前端只能读取快照或清空。

use tauri::State;

use crate::services::app_state::DesktopState;
use crate::services::log_buffer::LogSnapshot;

/// 获取日志快照（最新在前）
#[tauri::command]
pub async fn get_logs(state: State<'_, DesktopState>) -> Result<LogSnapshot, String> {
    Ok(state.logs.snapshot())
}

/// 清空日志
#[tauri::command]
pub async fn clear_logs(state: State<'_, DesktopState>) -> Result<(), String> {
    state.logs.clear();
    log::info!("日志已手动清空");
    Ok(())
}
