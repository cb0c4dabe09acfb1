//! # 后端自动化服务契约
//!
//! 后端（驱动微信客户端、管理多开实例、发送事件的服务）是外部协作方，
//! 这里只定义控制台消费的契约：拉取查询与命令调用（`Backend` trait），
//! 以及一个基于 HTTP 的实现（`HttpBackend`）。推送通道见 `sse` 模块。
//!
//! ## 响应约定
//! 后端所有接口统一返回 `{ code, msg, data }`，`code == 200` 表示成功；
//! 其它 code 或网络失败都转换为携带可读原因的错误字符串。

use std::future::Future;
use std::time::Duration;

use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::account::Account;
use crate::models::config::{WechatConfig, WechatPaths};
use crate::models::plugin::Plugin;
use crate::models::settings::PanelConfig;
use crate::models::theme::ThemeMode;
use crate::services::normalizer;

/// 后端成功响应码
pub const CODE_OK: i32 = 200;

/// 插件包上传回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub code: i32,
    #[serde(default)]
    pub msg: String,
}

impl UploadReceipt {
    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}

/// 后端契约
///
/// 每个方法都是一次异步调用，调用期间界面保持响应。
/// 错误值为可直接展示给用户的原因描述。
pub trait Backend: Send + Sync + 'static {
    fn fetch_accounts(&self) -> impl Future<Output = Result<Vec<Account>, String>> + Send;

    /// 启动一个新的微信实例
    fn launch_instance(&self) -> impl Future<Output = Result<bool, String>> + Send;

    /// 自动探测微信安装目录和缓存目录
    fn detect_wechat_paths(&self) -> impl Future<Output = Result<WechatPaths, String>> + Send;

    /// 禁止微信客户端自动更新
    fn disable_auto_update(&self) -> impl Future<Output = Result<(), String>> + Send;

    fn scan_plugins(&self) -> impl Future<Output = Result<Vec<Plugin>, String>> + Send;

    fn refresh_plugins(&self) -> impl Future<Output = Result<Vec<Plugin>, String>> + Send;

    fn open_plugin(&self, id: &str) -> impl Future<Output = Result<(), String>> + Send;

    fn uninstall_plugin(&self, id: &str) -> impl Future<Output = Result<(), String>> + Send;

    fn get_config(&self) -> impl Future<Output = Result<WechatConfig, String>> + Send;

    fn set_config(&self, config: &WechatConfig)
    -> impl Future<Output = Result<bool, String>> + Send;

    fn get_clear_log_threshold(&self) -> impl Future<Output = Result<usize, String>> + Send;

    fn get_theme(&self) -> impl Future<Output = Result<ThemeMode, String>> + Send;

    fn set_theme(&self, mode: ThemeMode) -> impl Future<Output = Result<bool, String>> + Send;

    /// 带外上传插件包（不属于推送/拉取契约）
    fn upload_plugin(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<UploadReceipt, String>> + Send;
}

/// 后端统一响应信封
#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<Value>,
}

/// 基于 HTTP 的后端实现
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpBackend {
    /// 根据控制台设置创建 HTTP 客户端
    ///
    /// # 错误
    /// 后端地址无法解析或 HTTP 客户端构建失败时返回错误
    pub fn new(config: &PanelConfig) -> Result<Self, String> {
        let base_url = Url::parse(&config.backend_url)
            .map_err(|e| format!("后端地址无效 {}: {}", config.backend_url, e))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| format!("创建 HTTP 客户端失败: {}", e))?;

        Ok(Self {
            client,
            base_url,
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    /// 共享的底层 HTTP 客户端（推送流复用同一个连接池）
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// 推送事件流地址
    pub fn events_url(&self) -> Result<Url, String> {
        self.endpoint(&["api", "plugin", "events"])
    }

    /// 按路径段拼接接口地址，路径段会被正确转义（插件 ID 可能包含特殊字符）
    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| format!("后端地址不能作为基础路径: {}", self.base_url))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// 发送请求并校验响应信封，返回 `data` 字段
    async fn call_raw(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<Option<Value>, String> {
        let url = self.endpoint(segments)?;
        let mut request = self
            .client
            .request(method, url.clone())
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("请求后端失败 {}: {}", url.path(), e))?;

        let status = response.status();
        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| format!("解析后端响应失败 {} ({}): {}", url.path(), status, e))?;

        if envelope.code != CODE_OK {
            let msg = if envelope.msg.is_empty() {
                format!("错误码 {}", envelope.code)
            } else {
                envelope.msg
            };
            return Err(msg);
        }

        Ok(envelope.data)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<T, String> {
        let data = self
            .call_raw(method, segments, body)
            .await?
            .unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| format!("后端返回的数据格式不正确: {}", e))
    }
}

impl Backend for HttpBackend {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, String> {
        // 拉取与推送共用同一套规范化，null 视为空列表
        let data = self
            .call_raw(Method::GET, &["api", "panel", "accounts"], None)
            .await?
            .unwrap_or(Value::Null);
        Ok(normalizer::normalize_list(&data))
    }

    async fn launch_instance(&self) -> Result<bool, String> {
        self.call(Method::POST, &["api", "panel", "wechat", "run"], None)
            .await
    }

    async fn detect_wechat_paths(&self) -> Result<WechatPaths, String> {
        self.call(Method::GET, &["api", "panel", "wechat", "paths"], None)
            .await
    }

    async fn disable_auto_update(&self) -> Result<(), String> {
        self.call_raw(Method::POST, &["api", "panel", "wechat", "no-update"], None)
            .await
            .map(|_| ())
    }

    async fn scan_plugins(&self) -> Result<Vec<Plugin>, String> {
        let plugins: Option<Vec<Plugin>> =
            self.call(Method::GET, &["api", "panel", "plugins"], None).await?;
        Ok(plugins.unwrap_or_default())
    }

    async fn refresh_plugins(&self) -> Result<Vec<Plugin>, String> {
        let plugins: Option<Vec<Plugin>> = self
            .call(Method::POST, &["api", "panel", "plugins", "refresh"], None)
            .await?;
        Ok(plugins.unwrap_or_default())
    }

    async fn open_plugin(&self, id: &str) -> Result<(), String> {
        self.call_raw(Method::POST, &["api", "panel", "plugins", id, "open"], None)
            .await
            .map(|_| ())
    }

    async fn uninstall_plugin(&self, id: &str) -> Result<(), String> {
        self.call_raw(Method::POST, &["api", "panel", "plugins", id, "uninstall"], None)
            .await
            .map(|_| ())
    }

    async fn get_config(&self) -> Result<WechatConfig, String> {
        self.call(Method::GET, &["api", "panel", "config"], None).await
    }

    async fn set_config(&self, config: &WechatConfig) -> Result<bool, String> {
        let body = serde_json::to_value(config).map_err(|e| format!("序列化配置失败: {}", e))?;
        self.call(Method::PUT, &["api", "panel", "config"], Some(body))
            .await
    }

    async fn get_clear_log_threshold(&self) -> Result<usize, String> {
        self.call(Method::GET, &["api", "panel", "config", "clear-log"], None)
            .await
    }

    async fn get_theme(&self) -> Result<ThemeMode, String> {
        let raw: Option<String> = self.call(Method::GET, &["api", "panel", "theme"], None).await?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(ThemeMode::Light),
            Some(value) => value.parse(),
        }
    }

    async fn set_theme(&self, mode: ThemeMode) -> Result<bool, String> {
        let body = serde_json::json!({ "theme": mode });
        self.call(Method::PUT, &["api", "panel", "theme"], Some(body))
            .await
    }

    async fn upload_plugin(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, String> {
        let url = self.endpoint(&["api", "plugin", "upload"])?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("上传请求失败: {}", e))?;

        response
            .json::<UploadReceipt>()
            .await
            .map_err(|e| format!("解析上传回执失败: {}", e))
    }
}

#[cfg(test)]
pub mod fake {
    //! 测试用的内存后端：可注入返回值与失败，并记录调用顺序

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;

    pub struct FakeBackend {
        pub accounts: Mutex<Result<Vec<Account>, String>>,
        pub launch: Mutex<Result<bool, String>>,
        pub paths: Mutex<Result<WechatPaths, String>>,
        pub plugins: Mutex<Result<Vec<Plugin>, String>>,
        pub open_result: Mutex<Result<(), String>>,
        pub uninstall_result: Mutex<Result<(), String>>,
        pub config: Mutex<Result<WechatConfig, String>>,
        pub set_config_result: Mutex<Result<bool, String>>,
        pub threshold: Mutex<Result<usize, String>>,
        pub theme: Mutex<Result<ThemeMode, String>>,
        /// 依次消费的 set_theme 结果；队列为空时确认成功
        pub set_theme_results: Mutex<VecDeque<Result<bool, String>>>,
        pub upload_receipt: Mutex<Result<UploadReceipt, String>>,
        /// 设置后，下一次 fetch_accounts 会等待该信号再返回
        pub accounts_gate: Mutex<Option<oneshot::Receiver<()>>>,
        /// 同上，作用于 launch_instance
        pub launch_gate: Mutex<Option<oneshot::Receiver<()>>>,
        /// 同上，作用于 set_config
        pub set_config_gate: Mutex<Option<oneshot::Receiver<()>>>,
        pub calls: Mutex<Vec<String>>,
        pub saved_configs: Mutex<Vec<WechatConfig>>,
        pub uploaded: Mutex<Vec<(String, usize)>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                accounts: Mutex::new(Ok(vec![])),
                launch: Mutex::new(Ok(true)),
                paths: Mutex::new(Ok(WechatPaths::default())),
                plugins: Mutex::new(Ok(vec![])),
                open_result: Mutex::new(Ok(())),
                uninstall_result: Mutex::new(Ok(())),
                config: Mutex::new(Ok(WechatConfig::default())),
                set_config_result: Mutex::new(Ok(true)),
                threshold: Mutex::new(Ok(500)),
                theme: Mutex::new(Ok(ThemeMode::Light)),
                set_theme_results: Mutex::new(VecDeque::new()),
                upload_receipt: Mutex::new(Ok(UploadReceipt {
                    code: CODE_OK,
                    msg: "上传成功".to_string(),
                })),
                accounts_gate: Mutex::new(None),
                launch_gate: Mutex::new(None),
                set_config_gate: Mutex::new(None),
                calls: Mutex::new(vec![]),
                saved_configs: Mutex::new(vec![]),
                uploaded: Mutex::new(vec![]),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|c| c.as_str() == name).count()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        async fn pass(gate: &Mutex<Option<oneshot::Receiver<()>>>) {
            let gate = gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        }
    }

    impl Backend for FakeBackend {
        async fn fetch_accounts(&self) -> Result<Vec<Account>, String> {
            self.record("fetch_accounts");
            Self::pass(&self.accounts_gate).await;
            self.accounts.lock().unwrap().clone()
        }

        async fn launch_instance(&self) -> Result<bool, String> {
            self.record("launch_instance");
            Self::pass(&self.launch_gate).await;
            self.launch.lock().unwrap().clone()
        }

        async fn detect_wechat_paths(&self) -> Result<WechatPaths, String> {
            self.record("detect_wechat_paths");
            self.paths.lock().unwrap().clone()
        }

        async fn disable_auto_update(&self) -> Result<(), String> {
            self.record("disable_auto_update");
            Ok(())
        }

        async fn scan_plugins(&self) -> Result<Vec<Plugin>, String> {
            self.record("scan_plugins");
            self.plugins.lock().unwrap().clone()
        }

        async fn refresh_plugins(&self) -> Result<Vec<Plugin>, String> {
            self.record("refresh_plugins");
            self.plugins.lock().unwrap().clone()
        }

        async fn open_plugin(&self, id: &str) -> Result<(), String> {
            self.record(format!("open_plugin:{}", id));
            self.open_result.lock().unwrap().clone()
        }

        async fn uninstall_plugin(&self, id: &str) -> Result<(), String> {
            self.record(format!("uninstall_plugin:{}", id));
            self.uninstall_result.lock().unwrap().clone()
        }

        async fn get_config(&self) -> Result<WechatConfig, String> {
            self.record("get_config");
            self.config.lock().unwrap().clone()
        }

        async fn set_config(&self, config: &WechatConfig) -> Result<bool, String> {
            self.record("set_config");
            Self::pass(&self.set_config_gate).await;
            let result = self.set_config_result.lock().unwrap().clone();
            if let Ok(true) = result {
                self.saved_configs.lock().unwrap().push(config.clone());
            }
            result
        }

        async fn get_clear_log_threshold(&self) -> Result<usize, String> {
            self.record("get_clear_log_threshold");
            self.threshold.lock().unwrap().clone()
        }

        async fn get_theme(&self) -> Result<ThemeMode, String> {
            self.record("get_theme");
            self.theme.lock().unwrap().clone()
        }

        async fn set_theme(&self, mode: ThemeMode) -> Result<bool, String> {
            self.record(format!("set_theme:{}", mode));
            let result = self
                .set_theme_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(true));
            if let Ok(true) = result {
                *self.theme.lock().unwrap() = Ok(mode);
            }
            result
        }

        async fn upload_plugin(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, String> {
            self.record(format!("upload_plugin:{}", file_name));
            self.uploaded
                .lock()
                .unwrap()
                .push((file_name.to_string(), bytes.len()));
            self.upload_receipt.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
pub mod canned {
    //! 回环地址上的假后端：每个连接按顺序返回一条预设的原始 HTTP 响应，并记录请求行

    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    pub struct Reply {
        raw: String,
        hold_open: bool,
    }

    impl Reply {
        pub fn json(body: Value) -> Self {
            Self::body("application/json", &body.to_string())
        }

        pub fn body(content_type: &str, body: &str) -> Self {
            Self {
                raw: format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    content_type,
                    body.len(),
                    body
                ),
                hold_open: false,
            }
        }

        /// 事件流响应；`hold_open` 时写完帧后保持连接不关闭
        pub fn event_stream(frames: &str, hold_open: bool) -> Self {
            Self {
                raw: format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n{}",
                    frames
                ),
                hold_open,
            }
        }
    }

    pub struct CannedServer {
        pub base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl CannedServer {
        /// 启动服务；预设响应用完后不再接受连接
        pub async fn start(replies: Vec<Reply>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));

            let log = requests.clone();
            tokio::spawn(async move {
                for reply in replies {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let request_line = read_request(&mut socket).await;
                    log.lock().unwrap().push(request_line);

                    if socket.write_all(reply.raw.as_bytes()).await.is_err() {
                        continue;
                    }
                    let _ = socket.flush().await;
                    if reply.hold_open {
                        tokio::spawn(async move {
                            let _socket = socket;
                            std::future::pending::<()>().await;
                        });
                    }
                }
            });

            Self { base_url, requests }
        }

        pub fn backend(&self) -> HttpBackend {
            HttpBackend::new(&PanelConfig {
                backend_url: self.base_url.clone(),
                ..PanelConfig::default()
            })
            .unwrap()
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// 读完整个请求（头部与正文），返回请求行
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(end) = find(&buf, b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body = &buf[end + 4..];
                let complete = if head.contains("transfer-encoding: chunked") {
                    find(body, b"0\r\n\r\n").is_some()
                } else {
                    body.len() >= content_length(&head)
                };
                if complete {
                    break;
                }
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        String::from_utf8_lossy(&buf)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }
}
