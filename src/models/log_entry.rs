//! # 日志条目数据模型
//!
//! 后端通过 `system:log` 推送主题发送的单条运行日志。
//! 日志只能由推送通道产生，不存在对应的拉取查询；一经创建即不可变。
//!
//! 对应前端 TypeScript 接口：
//! ```typescript
//! interface LogEntry {
//!   timestamp: string;
//!   response: string;
//!   type: string;
//!   message: string;
//!   color: string;
//! }
//! ```

use serde::{Deserialize, Serialize};

/// 日志标签的默认颜色（后端未指定颜色时使用）
pub const DEFAULT_LOG_COLOR: &str = "#409EFF";

/// 单条日志
///
/// 反序列化时同时接受后端历史字段名（`timeStamp`、`logType`、`msg`），
/// 序列化到前端时统一使用规范字段名。
///
/// 注意：显示顺序以到达顺序为准，`timestamp` 仅用于展示，不参与排序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 时间戳：后端生成的可读时间（如 "2025-11-23 18:00:00"）
    #[serde(alias = "timeStamp")]
    pub timestamp: String,

    /// 响应来源：产生该日志的微信实例或插件
    #[serde(default)]
    pub response: String,

    /// 日志类型标签（如 "群聊"、"私聊"、"注入成功"）
    #[serde(rename = "type", alias = "logType", default)]
    pub log_type: String,

    /// 日志正文
    #[serde(alias = "msg")]
    pub message: String,

    /// 类型标签的显示颜色
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_LOG_COLOR.to_string()
}

#[cfg(test)]
impl LogEntry {
    /// 测试辅助：以消息文本构造一条日志
    pub fn sample(message: &str) -> Self {
        Self {
            timestamp: "2025-11-23 18:00:00".to_string(),
            response: "wxid_test".to_string(),
            log_type: "私聊".to_string(),
            message: message.to_string(),
            color: DEFAULT_LOG_COLOR.to_string(),
        }
    }
}
