//! # 数据模型模块
//!
//! 定义了与前端 TypeScript 类型一一对应的 Rust 数据结构。
//! 所有结构体均派生 `Serialize` / `Deserialize`，用于后端通信与 Tauri IPC 传输。
//! - `account` - 微信账号
//! - `plugin` - 插件及其元数据
//! - `log_entry` - 推送日志条目
//! - `theme` - 主题模式与实际渲染主题
//! - `config` - 微信框架配置及其编辑草稿
//! - `settings` - 控制台自身设置

pub mod account;
pub mod config;
pub mod log_entry;
pub mod plugin;
pub mod settings;
pub mod theme;
