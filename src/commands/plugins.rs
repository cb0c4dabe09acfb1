//! # 插件 Tauri Commands
//!
//! 提供插件列表、打开、卸载与上传的 command 处理函数。
//! 卸载与上传成功后都会重新拉取完整的插件列表。

use std::path::PathBuf;

use tauri::{AppHandle, Runtime, State};
use tauri_plugin_dialog::DialogExt;

use crate::models::plugin::Plugin;
use crate::services::app_state::DesktopState;
use crate::services::backend::UploadReceipt;
use crate::services::reconciler::ReconciledList;
use crate::utils::path::PLUGIN_PACKAGE_EXTENSION;

/// 插件视图挂载：清空列表并扫描一次
#[tauri::command]
pub async fn mount_plugins(
    state: State<'_, DesktopState>,
) -> Result<ReconciledList<Plugin>, String> {
    Ok(state.facade.mount_plugins().await)
}

#[tauri::command]
pub async fn unmount_plugins(state: State<'_, DesktopState>) -> Result<(), String> {
    state.facade.unmount_plugins();
    Ok(())
}

#[tauri::command]
pub async fn get_plugins(
    state: State<'_, DesktopState>,
) -> Result<ReconciledList<Plugin>, String> {
    Ok(state.facade.plugins())
}

/// 让后端重新扫描插件目录
#[tauri::command]
pub async fn refresh_plugins(
    state: State<'_, DesktopState>,
) -> Result<ReconciledList<Plugin>, String> {
    state.facade.refresh_plugins().await
}

/// 打开插件界面
///
/// # 参数
/// - `id` - 插件 ID
#[tauri::command]
pub async fn open_plugin(id: String, state: State<'_, DesktopState>) -> Result<(), String> {
    state.facade.open_plugin(&id).await
}

/// 卸载插件，成功后重新拉取插件列表
///
/// # 参数
/// - `id` - 插件 ID
#[tauri::command]
pub async fn uninstall_plugin(id: String, state: State<'_, DesktopState>) -> Result<(), String> {
    state.facade.uninstall_plugin(&id).await
}

/// 上传指定路径的插件包（拖放上传）
///
/// # 参数
/// - `path` - 插件包绝对路径
///
/// # 错误
/// 不是 `.dog` 文件、超过大小上限、上传失败或后端拒绝时返回错误
#[tauri::command]
pub async fn upload_plugin(
    path: String,
    state: State<'_, DesktopState>,
) -> Result<UploadReceipt, String> {
    state.facade.upload_plugin(&PathBuf::from(path)).await
}

/// 弹出文件选择器选择插件包并上传
///
/// # 返回值
/// 用户取消选择时返回 `None`
#[tauri::command]
pub async fn pick_and_upload_plugin<R: Runtime>(
    app: AppHandle<R>,
    state: State<'_, DesktopState>,
) -> Result<Option<UploadReceipt>, String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    app.dialog()
        .file()
        .set_title("选择插件包")
        .add_filter("Ndog 插件包", &[PLUGIN_PACKAGE_EXTENSION])
        .pick_file(move |file| {
            let _ = tx.send(file);
        });

    let Some(file) = rx
        .await
        .map_err(|_| "文件选择对话框异常关闭".to_string())?
    else {
        return Ok(None);
    };

    let path = file
        .into_path()
        .map_err(|e| format!("无效的插件包路径: {}", e))?;
    state.facade.upload_plugin(&path).await.map(Some)
}
