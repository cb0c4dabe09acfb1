//! # 微信账号数据模型
//!
//! 定义后端管理的已登录微信实例（Account）。
//! 账号列表既可由拉取查询获得，也可由 `wechat:accounts:update` 推送获得，
//! 两者之间从不按字段合并：后到达的一方整体替换工作列表。

use serde::{Deserialize, Serialize};

/// 微信账号
///
/// `wxid` 是唯一键。除 `wxid` 外的字段缺失时取默认值，
/// 以兼容后端在实例刚注入、尚未登录时推送的不完整记录。
///
/// 对应前端 TypeScript 接口：
/// ```typescript
/// interface Account {
///   wxid: string;
///   nick: string;
///   wxNum: string;
///   avatarUrl: string;
///   port: number;
///   pid: number;
///   expireTime: string;
///   isExpire: 0 | 1;
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// 微信 ID（唯一键）
    pub wxid: String,

    /// 昵称
    #[serde(default)]
    pub nick: String,

    /// 微信号
    #[serde(default)]
    pub wx_num: String,

    /// 头像 URL
    #[serde(default)]
    pub avatar_url: String,

    /// 实例服务端口
    #[serde(default)]
    pub port: u16,

    /// 实例进程 ID
    #[serde(default)]
    pub pid: u32,

    /// 授权到期时间
    #[serde(default)]
    pub expire_time: String,

    /// 是否已到期（1 = 是，0 = 否）
    #[serde(default)]
    pub is_expire: u8,
}

impl Account {
    /// 授权是否已到期
    pub fn is_expired(&self) -> bool {
        self.is_expire == 1
    }
}

#[cfg(test)]
impl Account {
    /// 测试辅助：以 wxid 构造一个账号
    pub fn sample(wxid: &str) -> Self {
        Self {
            wxid: wxid.to_string(),
            nick: format!("nick-{}", wxid),
            wx_num: String::new(),
            avatar_url: String::new(),
            port: 30001,
            pid: 1000,
            expire_time: "2026-12-31".to_string(),
            is_expire: 0,
        }
    }
}
