//! # 推送事件流
//!
//! 后端通过 SSE（`text/event-stream`）推送事件，本模块负责：
//! - `SseFrameBuffer`：把任意切分的字节块还原为完整事件帧
//! - `pump_events`：维持长连接并把事件发布到 `EventBus`，断线后指数退避重连
//!
//! ## 帧格式
//! ```text
//! event: system:log
//! data: {"timeStamp":"…","msg":"…"}
//!
//! ```
//! 主题取 `event:` 行；没有 `event:` 行（或为默认的 `message`）时取 JSON 负载里的 `name` 字段。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::watch;

use crate::services::event_bus::EventBus;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// 单行长度上限；超出时整帧丢弃
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// 一个完整的推送事件
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub topic: String,
    pub payload: Value,
}

/// SSE 帧缓冲
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    /// 尚未遇到换行的残余字节（可能截断在 UTF-8 字符中间）
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    /// 超长行的剩余部分尚未读完
    discard_line: bool,
    /// 当前帧含有超长行，直到空行为止全部忽略
    discard_frame: bool,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一段字节，返回其中已完整的事件
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if std::mem::take(&mut self.discard_line) {
                continue;
            }
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        if self.pending.len() > MAX_LINE_BYTES {
            log::warn!("推送帧单行超过 {} 字节，丢弃该帧", MAX_LINE_BYTES);
            self.pending.clear();
            self.event = None;
            self.data.clear();
            self.discard_line = true;
            self.discard_frame = true;
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if self.discard_frame {
            if line.is_empty() {
                self.discard_frame = false;
                self.event = None;
                self.data.clear();
            }
            return None;
        }
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id / retry 不影响控制台
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");

        let payload: Value = match serde_json::from_str(&data) {
            Ok(payload) => payload,
            Err(e) => {
                log::debug!("丢弃无法解析的推送帧: {}", e);
                return None;
            }
        };

        let topic = event
            .filter(|name| !name.is_empty() && name != "message")
            .or_else(|| payload.get("name").and_then(Value::as_str).map(str::to_string));

        match topic {
            Some(topic) => Some(SseEvent { topic, payload }),
            None => {
                log::debug!("丢弃没有主题的推送帧");
                None
            }
        }
    }
}

/// 下一次重连等待时间
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max.max(INITIAL_BACKOFF))
}

/// 本次连接结束后的等待时间：收到过事件的连接视为健康，退避从头开始
fn retry_delay(backoff: Duration, delivered: usize) -> Duration {
    if delivered > 0 { INITIAL_BACKOFF } else { backoff }
}

/// 维持推送长连接，直到收到关闭信号
///
/// # 参数
/// - `client` - HTTP 客户端
/// - `url` - 事件流地址
/// - `bus` - 事件发布目标
/// - `shutdown` - 变为 `true` 时停止
/// - `max_backoff` - 重连等待上限
pub async fn pump_events(
    client: reqwest::Client,
    url: Url,
    bus: Arc<EventBus>,
    mut shutdown: watch::Receiver<bool>,
    max_backoff: Duration,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let mut delivered = 0usize;
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = stream_once(&client, &url, &bus, &mut delivered) => result,
        };

        let wait = retry_delay(backoff, delivered);
        match result {
            Ok(()) => log::info!("推送流已结束，{} 秒后重连", wait.as_secs()),
            Err(e) => log::warn!("推送流中断: {}，{} 秒后重连", e, wait.as_secs()),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        backoff = next_backoff(wait, max_backoff);
    }

    log::info!("推送流已停止");
}

async fn stream_once(
    client: &reqwest::Client,
    url: &Url,
    bus: &EventBus,
    delivered: &mut usize,
) -> Result<(), String> {
    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| format!("连接推送流失败: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("推送流返回状态 {}", response.status()));
    }
    log::info!("已连接推送流 {}", url);

    let mut frames = SseFrameBuffer::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("读取推送流失败: {}", e))?;
        for event in frames.feed(&chunk) {
            bus.publish(&event.topic, &event.payload);
            *delivered += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::services::backend::canned::{CannedServer, Reply};
    use crate::services::event_bus::{TOPIC_ACCOUNTS_UPDATE, TOPIC_SYSTEM_LOG};

    /// 订阅两个主题，按到达顺序记录 (主题, 负载)
    fn record(bus: &EventBus) -> (Arc<Mutex<Vec<(String, Value)>>>, Vec<crate::services::event_bus::Subscription>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = [TOPIC_SYSTEM_LOG, TOPIC_ACCOUNTS_UPDATE]
            .into_iter()
            .map(|topic| {
                let seen = seen.clone();
                bus.subscribe(topic, move |payload| {
                    seen.lock().unwrap().push((topic.to_string(), payload.clone()));
                })
            })
            .collect();
        (seen, subscriptions)
    }

    async fn wait_for(seen: &Mutex<Vec<(String, Value)>>, count: usize) {
        for _ in 0..500 {
            if seen.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("只收到 {} 个事件", seen.lock().unwrap().len());
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut frames = SseFrameBuffer::new();
        let raw = "event: system:log\r\ndata: {\"msg\":\"你好\"}\r\n\r\n".as_bytes();

        // 在多字节字符中间切开
        let split = raw.len() - 8;
        assert!(frames.feed(&raw[..split]).is_empty());
        let events = frames.feed(&raw[split..]);

        assert_eq!(
            events,
            [SseEvent {
                topic: "system:log".to_string(),
                payload: json!({ "msg": "你好" }),
            }]
        );
    }

    #[test]
    fn topic_falls_back_to_payload_name() {
        let mut frames = SseFrameBuffer::new();
        let events = frames.feed(
            b": keep-alive\n\ndata: {\"name\":\"wechat:accounts:update\",\n\
              data: \"data\":[[]]}\n\n",
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "wechat:accounts:update");
        assert_eq!(events[0].payload["data"], json!([[]]));
    }

    #[test]
    fn frames_without_topic_or_json_are_dropped() {
        let mut frames = SseFrameBuffer::new();
        assert!(frames.feed(b"data: {\"msg\":\"x\"}\n\n").is_empty());
        assert!(frames.feed(b"event: system:log\ndata: not json\n\n").is_empty());

        // 被丢弃的帧不影响下一帧
        let events = frames.feed(b"event: system:log\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn overlong_line_drops_its_frame_only() {
        let mut frames = SseFrameBuffer::new();
        let mut huge = b"event: system:log\ndata: ".to_vec();
        huge.extend(std::iter::repeat_n(b'x', MAX_LINE_BYTES + 1));
        assert!(frames.feed(&huge).is_empty());
        assert!(frames.pending.is_empty());

        // 超长行的结尾与同一帧的后续行都被忽略
        assert!(frames.feed(b"xxxx\ndata: {}\n\n").is_empty());

        let events = frames.feed(b"event: system:log\ndata: {\"msg\":\"ok\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!({ "msg": "ok" }));
    }

    #[test]
    fn delivery_resets_backoff() {
        let backoff = Duration::from_secs(16);
        assert_eq!(retry_delay(backoff, 0), backoff);
        assert_eq!(retry_delay(backoff, 3), INITIAL_BACKOFF);
    }

    #[tokio::test]
    async fn pump_publishes_frames_and_stops_on_shutdown() {
        let server = CannedServer::start(vec![Reply::event_stream(
            "event: system:log\ndata: {\"msg\":\"登录成功\"}\n\n\
             : keep-alive\n\n\
             data: {\"name\":\"wechat:accounts:update\",\"data\":[]}\n\n",
            true,
        )])
        .await;
        let backend = server.backend();
        let bus = Arc::new(EventBus::new());
        let (seen, _subscriptions) = record(&bus);
        let (stop, shutdown) = watch::channel(false);

        let pump = tokio::spawn(pump_events(
            backend.client(),
            backend.events_url().unwrap(),
            bus,
            shutdown,
            Duration::from_secs(30),
        ));
        wait_for(&seen, 2).await;

        assert_eq!(
            *seen.lock().unwrap(),
            [
                (TOPIC_SYSTEM_LOG.to_string(), json!({ "msg": "登录成功" })),
                (
                    TOPIC_ACCOUNTS_UPDATE.to_string(),
                    json!({ "name": "wechat:accounts:update", "data": [] })
                ),
            ]
        );
        assert_eq!(server.requests(), ["GET /api/plugin/events HTTP/1.1"]);

        // 连接仍然打开，关闭信号必须能打断读取
        stop.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), pump)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn pump_reconnects_after_stream_ends() {
        let server = CannedServer::start(vec![
            Reply::event_stream("event: system:log\ndata: {\"msg\":\"a\"}\n\n", false),
            Reply::event_stream("event: system:log\ndata: {\"msg\":\"b\"}\n\n", true),
        ])
        .await;
        let backend = server.backend();
        let bus = Arc::new(EventBus::new());
        let (seen, _subscriptions) = record(&bus);
        let (stop, shutdown) = watch::channel(false);

        let pump = tokio::spawn(pump_events(
            backend.client(),
            backend.events_url().unwrap(),
            bus,
            shutdown,
            Duration::from_secs(30),
        ));
        wait_for(&seen, 2).await;

        let messages: Vec<Value> = seen.lock().unwrap().iter().map(|(_, p)| p["msg"].clone()).collect();
        assert_eq!(messages, [json!("a"), json!("b")]);
        assert_eq!(server.requests().len(), 2);

        stop.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), pump)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_backoff() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/api/plugin/events", listener.local_addr().unwrap())).unwrap();
        drop(listener);

        let (stop, shutdown) = watch::channel(false);
        let pump = tokio::spawn(pump_events(
            reqwest::Client::new(),
            url,
            Arc::new(EventBus::new()),
            shutdown,
            Duration::from_secs(30),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 首次退避为 1 秒，关闭信号应当立即生效
        stop.send_replace(true);
        tokio::time::timeout(Duration::from_millis(500), pump)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn backoff_doubles_up_to_limit() {
        let max = Duration::from_secs(30);
        let mut backoff = INITIAL_BACKOFF;
        let mut seen = vec![];
        for _ in 0..7 {
            seen.push(backoff.as_secs());
            backoff = next_backoff(backoff, max);
        }
        assert_eq!(seen, [1, 2, 4, 8, 16, 30, 30]);
    }
}
