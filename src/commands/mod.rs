//! # Tauri Command 处理模块
//!
//! 本模块包含所有注册到 Tauri 的 command 处理函数。
//! 每个子模块对应一个功能域：
//! - `logs` - 日志缓冲区的查询与清空
//! - `accounts` - 账号视图挂载 / 卸载、启动微信实例
//! - `plugins` - 插件列表、打开、卸载与上传
//! - `settings` - 框架配置草稿、主题与界面信号上报

pub mod accounts;
pub mod logs;
pub mod plugins;
pub mod settings;
