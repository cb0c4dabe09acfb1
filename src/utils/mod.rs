//! # 通用工具函数
//!
//! - `path` - 控制台配置目录定位与插件包校验

pub mod path;
