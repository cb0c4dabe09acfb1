//! # 主题数据模型
//!
//! - `ThemeMode`：用户选择并持久化的主题模式（亮色 / 暗色 / 跟随系统）
//! - `EffectiveTheme`：实际渲染的主题，由 `ThemeMode` 与系统配色信号实时推导，不做缓存

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 主题模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
    /// 跟随系统：渲染时根据系统配色偏好决定亮暗
    System,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        }
    }

    /// 推导实际渲染主题
    ///
    /// 纯函数，对所有模式与系统信号组合都有定义：
    ///
    /// | 模式 | 系统暗色 | 结果 |
    /// |------|----------|------|
    /// | light | 任意 | light |
    /// | dark | 任意 | dark |
    /// | system | 是 | dark |
    /// | system | 否 | light |
    pub fn resolve(self, os_prefers_dark: bool) -> EffectiveTheme {
        match self {
            ThemeMode::Light => EffectiveTheme::Light,
            ThemeMode::Dark => EffectiveTheme::Dark,
            ThemeMode::System if os_prefers_dark => EffectiveTheme::Dark,
            ThemeMode::System => EffectiveTheme::Light,
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "system" => Ok(ThemeMode::System),
            other => Err(format!("无效的主题值 {}，仅支持: light, dark, system", other)),
        }
    }
}

/// 实际渲染主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveTheme {
    Light,
    Dark,
}

impl EffectiveTheme {
    /// 根节点背景色
    pub fn background_color(self) -> &'static str {
        match self {
            EffectiveTheme::Light => "#ffffff",
            EffectiveTheme::Dark => "#141414",
        }
    }
}

/// 推送给渲染树的主题快照
///
/// `revision` 在每次需要重新渲染时递增，
/// 使得"跟随系统"模式下系统配色变化也能触发重渲染（即使 `mode` 未变）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSnapshot {
    pub mode: ThemeMode,
    pub effective: EffectiveTheme,
    pub background: &'static str,
    pub revision: u64,
}
