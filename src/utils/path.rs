//! # 路径工具函数
//!
//! 提供与文件路径相关的工具函数，包括：
//! - 获取控制台自身配置目录路径（`~/.ndog/panel/`）
//! - 插件包（`.dog`）的扩展名与大小校验

use std::path::{Path, PathBuf};

/// 插件包扩展名
pub const PLUGIN_PACKAGE_EXTENSION: &str = "dog";

/// 控制台设置文件名
pub const PANEL_CONFIG_FILE: &str = "panel-config.json";

/// 获取控制台配置目录的绝对路径
///
/// 控制台的设置独立存储在 `~/.ndog/panel/` 目录下，
/// 与后端框架自身的配置分离。
///
/// # 错误
/// 如果无法确定用户主目录，返回错误信息。
pub fn get_panel_config_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "无法获取用户主目录".to_string())?;
    Ok(home.join(".ndog").join("panel"))
}

/// 获取控制台设置文件的绝对路径（`~/.ndog/panel/panel-config.json`）
pub fn get_panel_config_file() -> Result<PathBuf, String> {
    Ok(get_panel_config_dir()?.join(PANEL_CONFIG_FILE))
}

/// 是否为插件包（扩展名不区分大小写）
pub fn is_plugin_package(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PLUGIN_PACKAGE_EXTENSION))
}

/// 上传前校验插件包
///
/// # 参数
/// - `path` - 插件包路径
/// - `size` - 文件大小（字节）
/// - `max_size` - 允许的最大大小（字节）
///
/// # 返回值
/// 校验通过时返回上传使用的文件名
///
/// # 错误
/// 扩展名不是 `.dog` 或文件超过大小上限时返回错误
pub fn check_plugin_package(path: &Path, size: u64, max_size: u64) -> Result<String, String> {
    if !is_plugin_package(path) {
        return Err("只能上传 .dog 格式的插件包".to_string());
    }
    if size > max_size {
        return Err(format!(
            "插件包大小不能超过 {}MB",
            max_size.div_ceil(1024 * 1024)
        ));
    }

    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| format!("无效的插件包路径: {}", path.display()))
}
