//! # Ndog Panel - Tauri 应用核心初始化模块
//!
//! 本模块负责 Tauri 应用的完整初始化流程，包括：
//! - 注册 Tauri 官方插件（日志、对话框、键值存储）
//! - 加载控制台设置，构建后端客户端与显式持有的应用状态
//! - 启动后台任务（后端对账、主题信号监听、推送事件泵）
//! - 注册自定义 Tauri commands，并在退出时拆除应用状态
//!
//! ## 架构说明
//! 通过将核心逻辑放在 `lib.rs` 而非 `main.rs` 中，
//! Tauri 可以在桌面端（`main.rs`）和移动端入口之间共享此初始化代码。
//!
//! ## 模块结构
//! - `commands/` - Tauri command 处理函数（IPC 接口层）
//! - `models/` - 数据模型（对应前端 TypeScript 类型）
//! - `services/` - 实时状态同步层（规范化、日志缓冲、对账、主题、门面）
//! - `utils/` - 通用工具函数

mod commands;
mod models;
mod services;
mod utils;

use std::sync::Arc;

use tauri::{Manager, RunEvent, Theme, WindowEvent};
use tauri_plugin_store::StoreExt;

use services::app_state::DesktopState;
use services::backend::HttpBackend;
use services::panel_config;
use services::preference::{
    MemoryPreferenceStore, PreferenceStore, TauriPreferenceStore, PREFERENCES_FILE,
};
use services::ui_bridge::TauriBridge;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
/// Tauri 应用启动函数
///
/// # Panics
/// 如果 Tauri 应用启动失败（例如配置文件缺失或窗口创建失败），
/// 将通过 `.expect()` 触发 panic 并输出错误信息。
pub fn run() {
    let log_level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let app = tauri::Builder::default()
        // === 官方插件注册 ===
        // 日志插件：stdout + 应用日志目录，所有后端调用失败都会记录在这里
        .plugin(tauri_plugin_log::Builder::default().level(log_level).build())
        // 对话框插件：选择要上传的插件包
        .plugin(tauri_plugin_dialog::init())
        // 键值存储插件：持久化主题偏好
        .plugin(tauri_plugin_store::Builder::default().build())
        .setup(|app| {
            let settings = panel_config::load_panel_config();
            let backend = Arc::new(HttpBackend::new(&settings)?);

            let store: Arc<dyn PreferenceStore> = match app.store(PREFERENCES_FILE) {
                Ok(store) => Arc::new(TauriPreferenceStore::new(store)),
                Err(e) => {
                    log::warn!("打开偏好存储失败，主题偏好仅保存在内存中: {}", e);
                    Arc::new(MemoryPreferenceStore::new())
                }
            };
            let bridge = Arc::new(TauriBridge::new(app.handle().clone()));

            let state = DesktopState::new(backend, bridge, store, settings);
            state.start();

            if let Some(window) = app.get_webview_window("main") {
                match window.theme() {
                    Ok(theme) => state.theme.seed_os_preference(theme == Theme::Dark),
                    Err(e) => log::warn!("读取系统配色失败: {}", e),
                }
            }

            tauri::async_runtime::spawn(state.bootstrap());
            tauri::async_runtime::spawn(state.theme_listener());
            tauri::async_runtime::spawn(state.theme_forwarder());
            tauri::async_runtime::spawn(state.event_pump());

            app.manage(state);
            log::info!("Ndog Panel 已启动");
            Ok(())
        })
        // 系统配色变化：只影响"跟随系统"模式下的渲染
        .on_window_event(|window, event| {
            if let WindowEvent::ThemeChanged(theme) = event {
                if let Some(state) = window.try_state::<DesktopState>() {
                    state
                        .theme_signals
                        .os_preference_changed(*theme == Theme::Dark);
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            // 日志 commands
            commands::logs::get_logs,
            commands::logs::clear_logs,
            // 账号 commands
            commands::accounts::mount_accounts,
            commands::accounts::unmount_accounts,
            commands::accounts::get_accounts,
            commands::accounts::launch_wechat,
            // 插件 commands
            commands::plugins::mount_plugins,
            commands::plugins::unmount_plugins,
            commands::plugins::get_plugins,
            commands::plugins::refresh_plugins,
            commands::plugins::open_plugin,
            commands::plugins::uninstall_plugin,
            commands::plugins::upload_plugin,
            commands::plugins::pick_and_upload_plugin,
            // 配置与主题 commands
            commands::settings::get_panel_config,
            commands::settings::load_config,
            commands::settings::refresh_config,
            commands::settings::get_config_draft,
            commands::settings::edit_config,
            commands::settings::detect_wechat_paths,
            commands::settings::save_config,
            commands::settings::get_theme,
            commands::settings::set_theme,
            commands::settings::report_storage_change,
            commands::settings::report_os_theme,
        ])
        .build(tauri::generate_context!())
        .expect("error while running tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = handle.try_state::<DesktopState>() {
                state.shutdown();
            }
        }
    });
}
