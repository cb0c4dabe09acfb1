//! # 控制台自身设置数据模型
//!
//! 定义控制台（而非后端框架）自身的运行参数 `PanelConfig`，
//! 存储在 `~/.ndog/panel/panel-config.json`。文件中缺失的字段取默认值。

use serde::{Deserialize, Serialize};

/// 推送与拉取竞争时的对账策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcilePolicy {
    /// 按回调执行顺序，最后执行的写入生效
    LastWriteWins,
    /// 每次拉取在发起时领取序号，推送在送达时领取序号；
    /// 序号早于当前已应用版本的结果被丢弃
    #[default]
    RejectStale,
}

/// 控制台设置
///
/// 对应前端 TypeScript 接口：
/// ```typescript
/// interface PanelConfig {
///   backendUrl: string;
///   requestTimeoutSecs: number;
///   uploadRefetchDelayMs: number;
///   launchCooldownMs: number;
///   maxUploadBytes: number;
///   defaultClearLogThreshold: number;
///   reconcilePolicy: 'lastWriteWins' | 'rejectStale';
///   eventReconnectMaxSecs: number;
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelConfig {
    /// 后端自动化服务的 HTTP 地址
    pub backend_url: String,

    /// 单次拉取/命令请求的超时（秒）
    pub request_timeout_secs: u64,

    /// 插件包上传成功后，等待后端解压注册再刷新列表的延迟（毫秒）
    pub upload_refetch_delay_ms: u64,

    /// 启动微信实例后的冷却时间（毫秒），冷却期内拒绝再次启动
    pub launch_cooldown_ms: u64,

    /// 插件包大小上限（字节）
    pub max_upload_bytes: u64,

    /// 后端阈值加载完成前使用的日志清空阈值
    pub default_clear_log_threshold: usize,

    pub reconcile_policy: ReconcilePolicy,

    /// 推送流断线重连的最大退避时间（秒）
    pub event_reconnect_max_secs: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:9001".to_string(),
            request_timeout_secs: 10,
            upload_refetch_delay_ms: 1_000,
            launch_cooldown_ms: 3_000,
            max_upload_bytes: 50 * 1024 * 1024,
            default_clear_log_threshold: 500,
            reconcile_policy: ReconcilePolicy::RejectStale,
            event_reconnect_max_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: PanelConfig = serde_json::from_str(
            r#"{ "backendUrl": "http://127.0.0.1:9100", "reconcilePolicy": "lastWriteWins" }"#,
        )
        .unwrap();

        assert_eq!(config.backend_url, "http://127.0.0.1:9100");
        assert_eq!(config.reconcile_policy, ReconcilePolicy::LastWriteWins);
        assert_eq!(config.upload_refetch_delay_ms, 1_000);
        assert_eq!(config.default_clear_log_threshold, 500);
    }
}
