//! # 命令 / 查询门面
//!
//! 包装所有对后端的拉取查询与命令调用，统一成功 / 失败的汇报方式：
//! - 每个调用都返回 `Result<T, String>`，错误携带可读原因
//! - 失败时记录错误日志并推送错误提示，从不向上抛出 panic
//! - 影响列表的命令（卸载、上传、刷新）成功后重新拉取完整列表，
//!   而不是用命令结果在本地拼接；挂载时的初次拉取直接赋值
//!
//! 账号与插件列表的权威副本由本模块持有的两个 `Reconciler` 维护，
//! 推送通道送达的账号列表也经由这里替换。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::models::account::Account;
use crate::models::config::{CLEAR_LOG_RANGE, ConfigEdit, WechatConfig, WechatConfigDraft};
use crate::models::plugin::Plugin;
use crate::models::settings::PanelConfig;
use crate::models::theme::{ThemeMode, ThemeSnapshot};
use crate::services::backend::{Backend, UploadReceipt};
use crate::services::log_buffer::LogStore;
use crate::services::normalizer;
use crate::services::reconciler::{PullTicket, ReconciledList, Reconciler};
use crate::services::theme::ThemeCoordinator;
use crate::services::ui_bridge::{
    self, Notice, UiBridge, EVENT_ACCOUNTS_CHANGED, EVENT_PLUGINS_CHANGED,
};
use crate::utils::path;

enum LaunchState {
    Ready,
    InFlight,
    CoolingUntil(Instant),
}

/// 启动微信实例的节流闸门：启动中以及启动结束后的冷却期内拒绝再次启动
struct LaunchGate {
    cooldown: Duration,
    state: Mutex<LaunchState>,
}

impl LaunchGate {
    fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Mutex::new(LaunchState::Ready),
        }
    }

    /// 占用闸门；返回的许可被释放时（包括调用被中途取消）进入冷却期
    fn try_begin(&self) -> Result<LaunchPermit<'_>, String> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            LaunchState::InFlight => return Err("微信正在启动中，请稍候".to_string()),
            LaunchState::CoolingUntil(until) => {
                let now = Instant::now();
                if now < until {
                    let remaining = (until - now).as_millis().div_ceil(1000);
                    return Err(format!("操作过于频繁，请 {} 秒后再试", remaining));
                }
            }
            LaunchState::Ready => {}
        }
        *state = LaunchState::InFlight;
        Ok(LaunchPermit { gate: self })
    }

    fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = LaunchState::CoolingUntil(Instant::now() + self.cooldown);
    }
}

struct LaunchPermit<'a> {
    gate: &'a LaunchGate,
}

impl Drop for LaunchPermit<'_> {
    fn drop(&mut self) {
        self.gate.finish();
    }
}

/// 配置草稿状态（IPC 返回数据）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    pub config: WechatConfig,
    pub dirty: bool,
}

/// 命令 / 查询门面
pub struct Facade<B: Backend> {
    backend: Arc<B>,
    bridge: Arc<dyn UiBridge>,
    logs: Arc<LogStore>,
    theme: Arc<ThemeCoordinator>,
    accounts: Reconciler<Account>,
    plugins: Reconciler<Plugin>,
    /// 配置编辑草稿；首次加载前为 `None`
    draft: Mutex<Option<WechatConfigDraft>>,
    launch: LaunchGate,
    settings: PanelConfig,
}

impl<B: Backend> Facade<B> {
    pub fn new(
        backend: Arc<B>,
        bridge: Arc<dyn UiBridge>,
        logs: Arc<LogStore>,
        theme: Arc<ThemeCoordinator>,
        settings: PanelConfig,
    ) -> Self {
        Self {
            backend,
            bridge,
            logs,
            theme,
            accounts: Reconciler::new("账号", settings.reconcile_policy),
            plugins: Reconciler::new("插件", settings.reconcile_policy),
            draft: Mutex::new(None),
            launch: LaunchGate::new(Duration::from_millis(settings.launch_cooldown_ms)),
            settings,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // ========== 账号 ==========

    /// 账号视图挂载：清空列表并拉取一次
    ///
    /// 拉取失败时列表保持为空，状态为已加载。
    pub async fn mount_accounts(&self) -> ReconciledList<Account> {
        let ticket = self.accounts.mount();
        self.render_accounts();

        let result = self.backend.fetch_accounts().await;
        match self.report("获取账号列表", result) {
            Ok(accounts) => {
                self.accounts.complete_pull(ticket, accounts);
            }
            Err(_) => self.accounts.fail_pull(ticket),
        }

        self.render_accounts();
        self.accounts.snapshot()
    }

    pub fn unmount_accounts(&self) {
        self.accounts.unmount();
    }

    /// 推送通道送达的账号列表
    ///
    /// # 返回值
    /// 列表被替换时返回 `true`；负载无法识别时保持原列表并返回 `false`
    pub fn apply_account_push(&self, payload: &Value) -> bool {
        let Some(accounts) = normalizer::try_normalize_list::<Account>(payload) else {
            log::warn!("忽略无法识别的账号推送: {}", payload);
            return false;
        };

        let expired = accounts.iter().filter(|a| a.is_expired()).count();
        log::debug!("收到账号推送，共 {} 个账号（{} 个已到期）", accounts.len(), expired);
        self.accounts.apply_push(accounts);
        self.render_accounts();
        true
    }

    pub fn accounts(&self) -> ReconciledList<Account> {
        self.accounts.snapshot()
    }

    /// 启动一个新的微信实例
    ///
    /// 新账号上线后由推送通道更新列表，这里不修改本地列表。
    pub async fn launch_instance(&self) -> Result<(), String> {
        let permit = match self.launch.try_begin() {
            Ok(permit) => permit,
            Err(e) => {
                self.bridge.notice(Notice::warning(e.clone()));
                return Err(e);
            }
        };

        let result = match self.backend.launch_instance().await {
            Ok(true) => Ok(()),
            Ok(false) => Err("后端未能启动新实例".to_string()),
            Err(e) => Err(e),
        };
        drop(permit);

        self.report("启动微信", result)?;
        self.bridge.notice(Notice::success("启动成功！"));
        Ok(())
    }

    // ========== 插件 ==========

    /// 插件视图挂载：清空列表并扫描一次
    pub async fn mount_plugins(&self) -> ReconciledList<Plugin> {
        let ticket = self.plugins.mount();
        self.render_plugins();

        let result = self.backend.scan_plugins().await;
        match self.report("获取插件列表", result) {
            Ok(plugins) => {
                self.plugins.complete_pull(ticket, plugins);
            }
            Err(_) => self.plugins.fail_pull(ticket),
        }

        self.render_plugins();
        self.plugins.snapshot()
    }

    pub fn unmount_plugins(&self) {
        self.plugins.unmount();
    }

    pub fn plugins(&self) -> ReconciledList<Plugin> {
        self.plugins.snapshot()
    }

    /// 让后端重新扫描插件目录，并用结果替换列表
    pub async fn refresh_plugins(&self) -> Result<ReconciledList<Plugin>, String> {
        let ticket = self.plugins.begin_pull();
        let result = self.backend.refresh_plugins().await;
        let plugins = self.report("刷新插件列表", result)?;

        let count = plugins.len();
        self.plugins.complete_pull(ticket, plugins);
        self.render_plugins();
        self.bridge
            .notice(Notice::success(format!("刷新成功！共 {} 个插件", count)));
        Ok(self.plugins.snapshot())
    }

    /// 静默重新拉取插件列表（命令成功后的对账）
    async fn reload_plugins(&self) {
        let ticket = self.plugins.begin_pull();
        self.reload_plugins_with(ticket).await;
    }

    /// 凭据在发起时领取，期间视图卸载则结果被丢弃
    async fn reload_plugins_with(&self, ticket: PullTicket) {
        let result = self.backend.scan_plugins().await;
        if let Ok(plugins) = self.report("重新获取插件列表", result) {
            self.plugins.complete_pull(ticket, plugins);
            self.render_plugins();
        }
    }

    pub async fn open_plugin(&self, id: &str) -> Result<(), String> {
        let name = self.plugin_display_name(id);
        let result = self.backend.open_plugin(id).await;
        self.report(&format!("打开插件 {}", name), result)?;
        self.bridge
            .notice(Notice::success(format!("已打开插件 {}", name)));
        Ok(())
    }

    /// 卸载插件，成功后重新拉取完整列表
    pub async fn uninstall_plugin(&self, id: &str) -> Result<(), String> {
        let name = self.plugin_display_name(id);
        let result = self.backend.uninstall_plugin(id).await;
        self.report(&format!("卸载插件 {}", name), result)?;

        self.bridge
            .notice(Notice::success(format!("插件 {} 已卸载", name)));
        self.reload_plugins().await;
        Ok(())
    }

    /// 上传插件包
    ///
    /// 本地先校验扩展名与大小；后端受理（`code == 200`）后，
    /// 等待一小段时间让后端完成解压注册，再重新拉取插件列表。
    ///
    /// # 错误
    /// 校验失败、读取文件失败、上传失败或后端拒绝时返回错误
    pub async fn upload_plugin(self: &Arc<Self>, file: &Path) -> Result<UploadReceipt, String> {
        let file_name = match self.check_package(file).await {
            Ok(name) => name,
            Err(e) => {
                log::warn!("拒绝上传插件包 {}: {}", file.display(), e);
                self.bridge.notice(Notice::warning(e.clone()));
                return Err(e);
            }
        };

        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| format!("读取插件包失败: {}", e));
        let bytes = self.report("上传插件", bytes)?;

        let result = self.backend.upload_plugin(&file_name, bytes).await;
        let receipt = self.report("上传插件", result)?;
        if !receipt.is_success() {
            let msg = if receipt.msg.is_empty() {
                format!("错误码 {}", receipt.code)
            } else {
                receipt.msg.clone()
            };
            return self.report("上传插件", Err(msg));
        }

        log::info!("插件包 {} 上传成功", file_name);
        self.bridge.notice(Notice::info("上传成功，正在识别插件..."));

        let this = Arc::clone(self);
        let ticket = self.plugins.begin_pull();
        let delay = Duration::from_millis(self.settings.upload_refetch_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.reload_plugins_with(ticket).await;
        });

        Ok(receipt)
    }

    async fn check_package(&self, file: &Path) -> Result<String, String> {
        let metadata = tokio::fs::metadata(file)
            .await
            .map_err(|e| format!("读取插件包信息失败: {}", e))?;
        path::check_plugin_package(file, metadata.len(), self.settings.max_upload_bytes)
    }

    fn plugin_display_name(&self, id: &str) -> String {
        self.plugins
            .items()
            .iter()
            .find(|p| p.id() == id)
            .map(|p| p.name().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.to_string())
    }

    // ========== 配置 ==========

    /// 拉取完整配置并重置编辑草稿
    pub async fn load_config(&self) -> Result<WechatConfig, String> {
        let result = self.backend.get_config().await;
        let config = self.report("获取配置", result)?;

        let mut guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(draft) => draft.reload(config.clone()),
            None => *guard = Some(WechatConfigDraft::new(config.clone())),
        }
        Ok(config)
    }

    /// 重新加载配置，丢弃未保存的修改
    pub async fn refresh_config(&self) -> Result<WechatConfig, String> {
        let config = self.load_config().await?;
        self.bridge.notice(Notice::success("配置已刷新"));
        Ok(config)
    }

    /// 修改草稿中的一个字段
    ///
    /// # 返回值
    /// 修改后的草稿内容
    ///
    /// # 错误
    /// 配置尚未加载或取值超出范围时返回错误，草稿保持不变
    pub fn edit_config(&self, edit: ConfigEdit) -> Result<WechatConfig, String> {
        let mut guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
        let Some(draft) = guard.as_mut() else {
            return Err("配置尚未加载".to_string());
        };

        if let Err(e) = draft.apply(edit) {
            log::warn!("配置修改被拒绝: {}", e);
            self.bridge.notice(Notice::warning(e.clone()));
            return Err(e);
        }
        Ok(draft.config().clone())
    }

    /// 当前草稿（未加载时为 `None`）
    pub fn config_draft(&self) -> Option<WechatConfig> {
        self.draft_state().map(|state| state.config)
    }

    /// 当前草稿及其是否有未保存的修改
    pub fn draft_state(&self) -> Option<DraftState> {
        self.draft
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|draft| DraftState {
                config: draft.config().clone(),
                dirty: draft.is_dirty(),
            })
    }

    /// 由后端自动探测微信安装目录与缓存目录，并填入草稿
    pub async fn detect_wechat_paths(&self) -> Result<WechatConfig, String> {
        if self.config_draft().is_none() {
            return Err("配置尚未加载".to_string());
        }

        let result = self.backend.detect_wechat_paths().await;
        let paths = self.report("获取微信路径", result)?;

        let config = {
            let mut guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
            let draft = guard.as_mut().ok_or_else(|| "配置尚未加载".to_string())?;
            draft.apply_paths(&paths);
            draft.config().clone()
        };
        self.bridge.notice(Notice::success("已自动获取微信路径"));
        Ok(config)
    }

    /// 保存草稿
    ///
    /// 任何字段超出范围时拒绝保存。保存成功后：
    /// - 草稿以已保存的配置为新基线；等待后端期间的新修改保留，草稿仍为未保存状态
    /// - 日志缓冲区阈值更新为保存的 `clearLog`
    /// - 异步请求后端禁止微信自动更新（不等待结果）
    pub async fn save_config(&self) -> Result<(), String> {
        let built = {
            let guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(draft) => draft.build().map(|config| (config, draft.revision())),
                None => Err("配置尚未加载".to_string()),
            }
        };
        let (config, revision) = match built {
            Ok(built) => built,
            Err(e) => {
                log::warn!("拒绝保存配置: {}", e);
                self.bridge.notice(Notice::warning(e.clone()));
                return Err(e);
            }
        };

        let result = match self.backend.set_config(&config).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("后端拒绝保存".to_string()),
            Err(e) => Err(e),
        };
        self.report("保存配置", result)?;

        self.logs.set_threshold(config.clear_log as usize);
        {
            let mut guard = self.draft.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(draft) = guard.as_mut() {
                draft.mark_saved(revision);
                if draft.is_dirty() {
                    log::info!("保存期间草稿又被修改，保留未保存的修改");
                }
            }
        }
        self.bridge.notice(Notice::success("保存成功！"));

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.disable_auto_update().await {
                log::warn!("禁止微信自动更新失败: {}", e);
            }
        });
        Ok(())
    }

    // ========== 日志阈值 / 主题 ==========

    /// 从后端获取日志清空阈值
    ///
    /// 获取失败时沿用当前值；取值超出 `CLEAR_LOG_RANGE` 时记录警告并沿用当前值（不截断）。
    ///
    /// # 返回值
    /// 生效的阈值
    pub async fn load_log_threshold(&self) -> Result<usize, String> {
        let result = self.backend.get_clear_log_threshold().await;
        let threshold = self.report("获取日志清空阈值", result)?;

        let (min, max) = CLEAR_LOG_RANGE;
        if !(min as usize..=max as usize).contains(&threshold) {
            let current = self.logs.threshold();
            log::warn!(
                "后端返回的日志清空阈值 {} 超出 {} ~ {}，沿用 {}",
                threshold,
                min,
                max,
                current
            );
            return Ok(current);
        }

        self.logs.set_threshold(threshold);
        log::info!("日志清空阈值: {}", threshold);
        Ok(threshold)
    }

    pub async fn set_theme(&self, mode: ThemeMode) -> Result<ThemeSnapshot, String> {
        match self.theme.set_theme(self.backend.as_ref(), mode).await {
            Ok(snapshot) => {
                self.bridge.notice(Notice::success("主题设置成功！"));
                Ok(snapshot)
            }
            Err(e) => {
                log::error!("主题设置失败: {}", e);
                self.bridge.notice(Notice::error(format!("主题设置失败：{}", e)));
                Err(e)
            }
        }
    }

    // ========== 内部 ==========

    /// 统一失败汇报：记录错误日志并推送错误提示
    fn report<T>(&self, action: &str, result: Result<T, String>) -> Result<T, String> {
        result.map_err(|e| {
            let message = format!("{}失败: {}", action, e);
            log::error!("{}", message);
            self.bridge.notice(Notice::error(message.clone()));
            message
        })
    }

    fn render_accounts(&self) {
        ui_bridge::render_json(
            self.bridge.as_ref(),
            EVENT_ACCOUNTS_CHANGED,
            &self.accounts.snapshot(),
        );
    }

    fn render_plugins(&self) {
        ui_bridge::render_json(
            self.bridge.as_ref(),
            EVENT_PLUGINS_CHANGED,
            &self.plugins.snapshot(),
        );
    }
}
