//! # 微信框架配置数据模型
//!
//! `WechatConfig` 是后端配置文件 `wechat` 段的扁平记录：整体获取、整体提交，
//! 从不向后端发送单字段的局部更新。
//!
//! 前端的每次字段编辑只修改本地草稿（`WechatConfigDraft`），
//! 直到显式保存时才把整条记录提交给后端。草稿通过带类型的字段 setter 修改，
//! setter 会做范围校验，保存前再对整条记录做一次完整校验。

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// 下载超时范围（毫秒）：界面以秒编辑，1 ~ 100 秒
pub const TIMEOUT_MS_RANGE: (u64, u64) = (1_000, 100_000);

/// 登录后忽略消息的时长范围（秒）
pub const IGNORE_MSG_RANGE: (u32, u32) = (1, 100);

/// 日志自动清空阈值范围
pub const CLEAR_LOG_RANGE: (u32, u32) = (100, 500);

/// 当前支持的微信版本
pub const DEFAULT_WECHAT_VERSION: &str = "4.12.17";

/// 开关型配置项
///
/// 后端以字符串 `"0"` / `"1"` 存储；读取时同时兼容数字与布尔值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Switch {
    #[default]
    Off,
    On,
}

impl Serialize for Switch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Switch::Off => "0",
            Switch::On => "1",
        })
    }
}

impl<'de> Deserialize<'de> for Switch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Num(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) | Raw::Num(1) => Ok(Switch::On),
            Raw::Bool(false) | Raw::Num(0) => Ok(Switch::Off),
            Raw::Text(text) if text.trim() == "1" => Ok(Switch::On),
            Raw::Text(text) if text.trim() == "0" => Ok(Switch::Off),
            _ => Err(de::Error::custom("开关值仅支持 \"0\" 或 \"1\"")),
        }
    }
}

/// 后端可能以字符串形式保存数值（YAML 手工编辑），读取时统一转为整数
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Float(f) if f >= 0.0 => Ok(f as u64),
        Raw::Float(f) => Err(de::Error::custom(format!("数值不能为负: {}", f))),
        Raw::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|e| de::Error::custom(format!("无法解析数值 {}: {}", text, e))),
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = lenient_u64(deserializer)?;
    u32::try_from(value).map_err(|_| de::Error::custom(format!("数值超出范围: {}", value)))
}

/// 微信框架配置
///
/// 未识别的字段保存在 `extra` 中，提交时原样写回，避免后端新增字段在往返中丢失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WechatConfig {
    /// 微信安装目录（末尾不带路径分隔符）
    pub installation_path: String,

    /// 缓存目录：保存解密后的图片和文件
    pub cache_path: String,

    /// 微信版本（列表，首项为当前选中版本）
    pub version: Vec<String>,

    /// 禁止微信自动更新
    pub update: Switch,

    /// 是否解密收到的图片
    pub decode_pict: Switch,

    /// 原图下载超时（毫秒）
    #[serde(deserialize_with = "lenient_u64")]
    pub time_out: u64,

    /// 登录成功后忽略消息的时长（秒）
    #[serde(deserialize_with = "lenient_u32")]
    pub ignore_msg: u32,

    /// 日志自动清空阈值
    #[serde(deserialize_with = "lenient_u32")]
    pub clear_log: u32,

    /// 显示日志
    pub logs: bool,

    /// 文本消息发送失败时自动重发
    pub resend: Switch,

    /// 监听群成员进群/退群事件
    pub group_member_event: Switch,

    /// 根据语音 ID 获取 SILK 文件
    pub hook_silk: Switch,

    /// 未识别的字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            installation_path: String::new(),
            cache_path: String::new(),
            version: vec![DEFAULT_WECHAT_VERSION.to_string()],
            update: Switch::On,
            decode_pict: Switch::Off,
            time_out: 5_000,
            ignore_msg: 5,
            clear_log: 500,
            logs: false,
            resend: Switch::On,
            group_member_event: Switch::Off,
            hook_silk: Switch::Off,
            extra: Map::new(),
        }
    }
}

impl WechatConfig {
    /// 完整校验整条记录
    ///
    /// # 错误
    /// 任一字段越界时返回错误，错误信息列出全部越界字段
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        if !(TIMEOUT_MS_RANGE.0..=TIMEOUT_MS_RANGE.1).contains(&self.time_out) {
            problems.push(format!(
                "下载超时须在 {} ~ {} 秒之间（当前 {} 毫秒）",
                TIMEOUT_MS_RANGE.0 / 1000,
                TIMEOUT_MS_RANGE.1 / 1000,
                self.time_out
            ));
        }
        if !(IGNORE_MSG_RANGE.0..=IGNORE_MSG_RANGE.1).contains(&self.ignore_msg) {
            problems.push(format!(
                "忽略消息时长须在 {} ~ {} 秒之间（当前 {}）",
                IGNORE_MSG_RANGE.0, IGNORE_MSG_RANGE.1, self.ignore_msg
            ));
        }
        if !(CLEAR_LOG_RANGE.0..=CLEAR_LOG_RANGE.1).contains(&self.clear_log) {
            problems.push(format!(
                "日志自动清空阈值须在 {} ~ {} 之间（当前 {}）",
                CLEAR_LOG_RANGE.0, CLEAR_LOG_RANGE.1, self.clear_log
            ));
        }
        if self.version.first().is_none_or(|v| v.trim().is_empty()) {
            problems.push("未选择微信版本".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(format!("配置校验失败：{}", problems.join("；")))
        }
    }
}

/// 后端自动探测到的微信目录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WechatPaths {
    pub installation_path: String,
    pub cache_path: String,
}

/// 单字段编辑指令
///
/// 前端以 `{ "field": "clearLog", "value": 300 }` 形式发送。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ConfigEdit {
    InstallationPath(String),
    CachePath(String),
    Version(String),
    /// 以秒为单位编辑，存储为毫秒
    TimeOutSecs(f64),
    IgnoreMsg(u32),
    ClearLog(u32),
    Logs(bool),
    Update(Switch),
    DecodePict(Switch),
    Resend(Switch),
    GroupMemberEvent(Switch),
    HookSilk(Switch),
}

/// 配置草稿
///
/// 持有一份从后端获取的完整配置副本；所有编辑都落在副本上，
/// 越界的编辑被拒绝且不修改草稿。
///
/// 每次编辑或重新加载都会递增 `revision`，保存在等待后端期间
/// 草稿可能继续被编辑，保存完成时据此判断是否还有未保存的修改。
#[derive(Debug, Clone)]
pub struct WechatConfigDraft {
    config: WechatConfig,
    dirty: bool,
    revision: u64,
}

impl WechatConfigDraft {
    pub fn new(config: WechatConfig) -> Self {
        Self {
            config,
            dirty: false,
            revision: 0,
        }
    }

    /// 以重新获取的配置替换草稿，丢弃未保存的修改
    pub fn reload(&mut self, config: WechatConfig) {
        self.config = config;
        self.dirty = false;
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 标记 `revision` 版本的草稿已保存
    ///
    /// 该版本之后又有编辑时草稿保持原样，仍视为有未保存的修改。
    pub fn mark_saved(&mut self, revision: u64) {
        if self.revision == revision {
            self.dirty = false;
        }
    }

    pub fn config(&self) -> &WechatConfig {
        &self.config
    }

    /// 草稿是否有未保存的修改
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 应用一条编辑指令
    pub fn apply(&mut self, edit: ConfigEdit) -> Result<(), String> {
        match edit {
            ConfigEdit::InstallationPath(path) => self.set_installation_path(&path),
            ConfigEdit::CachePath(path) => self.set_cache_path(&path),
            ConfigEdit::Version(version) => self.set_version(&version)?,
            ConfigEdit::TimeOutSecs(secs) => self.set_timeout_secs(secs)?,
            ConfigEdit::IgnoreMsg(secs) => self.set_ignore_msg(secs)?,
            ConfigEdit::ClearLog(threshold) => self.set_clear_log(threshold)?,
            ConfigEdit::Logs(enabled) => self.set(|c| c.logs = enabled),
            ConfigEdit::Update(value) => self.set(|c| c.update = value),
            ConfigEdit::DecodePict(value) => self.set(|c| c.decode_pict = value),
            ConfigEdit::Resend(value) => self.set(|c| c.resend = value),
            ConfigEdit::GroupMemberEvent(value) => self.set(|c| c.group_member_event = value),
            ConfigEdit::HookSilk(value) => self.set(|c| c.hook_silk = value),
        }
        Ok(())
    }

    /// 设置安装目录，自动去掉末尾的路径分隔符
    pub fn set_installation_path(&mut self, path: &str) {
        let trimmed = path.trim().trim_end_matches(['\\', '/']).to_string();
        self.set(|c| c.installation_path = trimmed);
    }

    pub fn set_cache_path(&mut self, path: &str) {
        let trimmed = path.trim().to_string();
        self.set(|c| c.cache_path = trimmed);
    }

    /// 套用后端探测到的目录（两个目录同时覆盖）
    pub fn apply_paths(&mut self, paths: &WechatPaths) {
        self.set_installation_path(&paths.installation_path);
        self.set_cache_path(&paths.cache_path);
    }

    pub fn set_version(&mut self, version: &str) -> Result<(), String> {
        let version = version.trim();
        if version.is_empty() {
            return Err("微信版本不能为空".to_string());
        }
        let version = version.to_string();
        self.set(|c| c.version = vec![version]);
        Ok(())
    }

    /// 以秒为单位设置下载超时，存储为向下取整的毫秒数
    pub fn set_timeout_secs(&mut self, secs: f64) -> Result<(), String> {
        if !secs.is_finite() {
            return Err("下载超时必须是有效数字".to_string());
        }
        let millis = (secs * 1000.0).floor();
        if millis < TIMEOUT_MS_RANGE.0 as f64 || millis > TIMEOUT_MS_RANGE.1 as f64 {
            return Err(format!(
                "下载超时须在 {} ~ {} 秒之间",
                TIMEOUT_MS_RANGE.0 / 1000,
                TIMEOUT_MS_RANGE.1 / 1000
            ));
        }
        self.set(|c| c.time_out = millis as u64);
        Ok(())
    }

    pub fn set_ignore_msg(&mut self, secs: u32) -> Result<(), String> {
        check_range("忽略消息时长", secs, IGNORE_MSG_RANGE)?;
        self.set(|c| c.ignore_msg = secs);
        Ok(())
    }

    pub fn set_clear_log(&mut self, threshold: u32) -> Result<(), String> {
        check_range("日志自动清空阈值", threshold, CLEAR_LOG_RANGE)?;
        self.set(|c| c.clear_log = threshold);
        Ok(())
    }

    /// 生成待提交的完整配置
    ///
    /// # 错误
    /// 草稿中仍有越界字段（例如后端返回的原始值本身越界）时返回错误
    pub fn build(&self) -> Result<WechatConfig, String> {
        self.config.validate()?;
        Ok(self.config.clone())
    }

    fn set(&mut self, mutate: impl FnOnce(&mut WechatConfig)) {
        mutate(&mut self.config);
        self.dirty = true;
        self.revision += 1;
    }
}

fn check_range(label: &str, value: u32, (min, max): (u32, u32)) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{}须在 {} ~ {} 之间（当前 {}）", label, min, max, value))
    }
}
