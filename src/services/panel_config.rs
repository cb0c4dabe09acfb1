//! # 控制台设置加载
//!
//! 启动时读取 `~/.ndog/panel/panel-config.json`。文件不存在或无法解析时
//! 使用默认设置并记录警告，控制台始终能够启动。

use std::path::Path;

use crate::models::settings::PanelConfig;
use crate::utils::path;

/// 从默认位置加载控制台设置
pub fn load_panel_config() -> PanelConfig {
    match path::get_panel_config_file() {
        Ok(file) => load_from(&file),
        Err(e) => {
            log::warn!("无法定位控制台设置文件，使用默认设置: {}", e);
            PanelConfig::default()
        }
    }
}

/// 从指定文件加载控制台设置，缺失的字段取默认值
pub fn load_from(file: &Path) -> PanelConfig {
    if !file.exists() {
        log::info!("控制台设置文件不存在，使用默认设置: {}", file.display());
        return PanelConfig::default();
    }

    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("读取控制台设置文件失败，使用默认设置: {}", e);
            return PanelConfig::default();
        }
    };

    match serde_json::from_str::<PanelConfig>(&content) {
        Ok(config) => {
            log::info!("已加载控制台设置: {}", file.display());
            config
        }
        Err(e) => {
            log::warn!("解析控制台设置文件失败，使用默认设置: {}", e);
            PanelConfig::default()
        }
    }
}
