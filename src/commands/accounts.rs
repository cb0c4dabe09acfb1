//! # 账号 Tauri Commands
//!
//! 账号视图挂载时拉取一次列表，之后由推送通道持续替换；
//! 卸载后仍在途的拉取结果会被忽略。

use tauri::State;

use crate::models::account::Account;
use crate::services::app_state::DesktopState;
use crate::services::reconciler::ReconciledList;

/// 账号视图挂载
///
/// # 返回值
/// 拉取完成后的账号列表；拉取失败时为空列表（错误已通过提示消息展示）
#[tauri::command]
pub async fn mount_accounts(
    state: State<'_, DesktopState>,
) -> Result<ReconciledList<Account>, String> {
    Ok(state.facade.mount_accounts().await)
}

/// 账号视图卸载
#[tauri::command]
pub async fn unmount_accounts(state: State<'_, DesktopState>) -> Result<(), String> {
    state.facade.unmount_accounts();
    Ok(())
}

#[tauri::command]
pub async fn get_accounts(
    state: State<'_, DesktopState>,
) -> Result<ReconciledList<Account>, String> {
    Ok(state.facade.accounts())
}

/// 启动一个新的微信实例
///
/// # 错误
/// 冷却期内、后端调用失败或后端未能启动时返回错误
#[tauri::command]
pub async fn launch_wechat(state: State<'_, DesktopState>) -> Result<(), String> {
    state.facade.launch_instance().await
}
