//! # 插件数据模型
//!
//! 插件生命周期：后端扫描发现 → 列出 → 可选启动（仅副作用，本地状态不变）
//! → 可选卸载（卸载后重新拉取整表，而不是在本地剔除记录）。

use serde::{Deserialize, Serialize};

/// 插件元数据
///
/// 对应插件包内的清单文件，`id` 是唯一键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    /// 插件 ID（唯一键）
    pub id: String,

    /// 插件名称
    pub name: String,

    /// 版本号
    #[serde(default)]
    pub version: String,

    /// 描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 作者
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// 插件列表项
///
/// 对应前端 TypeScript 接口：
/// ```typescript
/// interface Plugin {
///   metadata: { id: string; name: string; version: string; description?: string; author?: string };
///   iconUrl: string;
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub metadata: PluginMetadata,

    /// 图标 URL（由后端静态文件服务提供）
    #[serde(default)]
    pub icon_url: String,
}

impl Plugin {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[cfg(test)]
impl Plugin {
    /// 测试辅助：以 id 构造一个插件
    pub fn sample(id: &str) -> Self {
        Self {
            metadata: PluginMetadata {
                id: id.to_string(),
                name: format!("插件{}", id),
                version: "1.0.0".to_string(),
                description: None,
                author: None,
            },
            icon_url: String::new(),
        }
    }
}
