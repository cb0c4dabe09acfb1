//! # 推送事件负载规范化
//!
//! 后端推送的负载形状并不统一，可能是：
//! - 裸值：直接就是日志对象或账号数组
//! - 信封：`{ "name": "...", "data": ... }`，真正的负载在 `data` 字段
//! - 双重嵌套信封：`{ "data": [[a, b]] }`，事件系统把数组参数又包了一层
//!
//! ## 解包规则
//! 1. 输入本身是数组 → 直接作为集合
//! 2. 输入带 `data` 字段 → 检查 `data`：
//!    - `data` 是数组且首元素也是数组 → 取首元素（纠正双重嵌套）
//!    - `data` 是数组 → 原样使用
//!    - 其它 → 视为单元素结果
//!
//! 两个推送通道的元数不同（日志为单条、账号为列表），使用同一条解包规则分别规范化。
//!
//! ## 容错策略
//! 无法识别的负载永远不会向调用方抛错：列表通道退化为空序列或"无结果"，
//! 单条通道直接丢弃。后端负载格式漂移不能让界面崩溃。

use serde::de::DeserializeOwned;
use serde_json::Value;

/// 解包后的规范负载
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    /// 有序集合
    Many(&'a [Value]),
    /// 单个值
    One(&'a Value),
}

/// 按解包规则提取负载
///
/// 只识别数组和信封两种形状；既不是数组、也没有 `data` 字段的输入返回 `None`。
/// `data` 为 `null` 时视为空集合（后端以空切片发送空列表时可能序列化为 `null`）。
pub fn unwrap_envelope(input: &Value) -> Option<Payload<'_>> {
    match input {
        Value::Array(items) => Some(Payload::Many(items)),
        Value::Object(map) => match map.get("data")? {
            Value::Array(items) => match items.first() {
                Some(Value::Array(inner)) => Some(Payload::Many(inner)),
                _ => Some(Payload::Many(items)),
            },
            Value::Null => Some(Payload::Many(&[])),
            other => Some(Payload::One(other)),
        },
        _ => None,
    }
}

/// 规范化单条负载（日志通道）
///
/// 集合取首元素；没有 `data` 字段的对象视为裸值本身。
/// 无法解析为 `T` 时返回 `None`（丢弃该事件）。
pub fn normalize_single<T: DeserializeOwned>(input: &Value) -> Option<T> {
    let candidate = match unwrap_envelope(input) {
        Some(Payload::Many(items)) => items.first()?,
        Some(Payload::One(value)) => value,
        None if input.is_object() => input,
        None => {
            log::debug!("丢弃无法识别的单条推送负载: {}", input);
            return None;
        }
    };

    match T::deserialize(candidate) {
        Ok(item) => Some(item),
        Err(e) => {
            log::debug!("丢弃无法解析的单条推送负载: {}", e);
            None
        }
    }
}

/// 规范化列表负载，区分"合法的空列表"与"无法识别的负载"
///
/// # 返回值
/// - `Some(items)` - 负载形状可识别；单个元素解析失败时跳过该元素
/// - `None` - 负载无法解包，或集合非空但没有任何元素能解析为 `T`
pub fn try_normalize_list<T: DeserializeOwned>(input: &Value) -> Option<Vec<T>> {
    let items: &[Value] = match unwrap_envelope(input)? {
        Payload::Many(items) => items,
        Payload::One(value) => std::slice::from_ref(value),
    };

    let parsed: Vec<T> = items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("跳过无法解析的列表元素: {}", e);
                None
            }
        })
        .collect();

    if parsed.is_empty() && !items.is_empty() {
        return None;
    }
    Some(parsed)
}

/// 规范化列表负载（账号拉取），无法识别时退化为空序列
pub fn normalize_list<T: DeserializeOwned>(input: &Value) -> Vec<T> {
    try_normalize_list(input).unwrap_or_default()
}
