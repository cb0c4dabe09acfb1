//! # 推送事件总线
//!
//! 推送通道（SSE 事件流）送达的事件按主题分发给订阅者。
//! 同一主题的处理函数按订阅顺序调用，事件按发布顺序送达。
//!
//! 订阅返回 `Subscription` 句柄，`release()` 或 drop 时注销，且只注销一次。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

/// 日志主题：每个事件携带一条日志
pub const TOPIC_SYSTEM_LOG: &str = "system:log";

/// 账号列表主题：每个事件携带完整的账号列表
pub const TOPIC_ACCOUNTS_UPDATE: &str = "wechat:accounts:update";

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

/// 按主题分发的事件总线
#[derive(Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅主题
    ///
    /// # 返回值
    /// 订阅句柄；句柄被释放时处理函数注销
    pub fn subscribe(
        &self,
        topic: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));

        log::debug!("订阅推送主题 {} (#{})", topic, id);
        Subscription {
            topic: topic.to_string(),
            id,
            registry: Arc::downgrade(&self.registry),
            released: false,
        }
    }

    /// 发布事件
    ///
    /// 处理函数在锁外调用，处理函数内部可以再订阅或注销。
    ///
    /// # 返回值
    /// 被调用的处理函数数量
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        let handlers: Vec<Handler> = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            match registry.handlers.get(topic) {
                Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
                None => return 0,
            }
        };

        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .map(|registry| registry.handlers.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

/// 订阅句柄
pub struct Subscription {
    topic: String,
    id: u64,
    registry: Weak<RwLock<Registry>>,
    released: bool,
}

impl Subscription {
    /// 显式注销
    pub fn release(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // 总线已销毁时无需注销
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.write().unwrap_or_else(|e| e.into_inner());
        if let Some(handlers) = registry.handlers.get_mut(&self.topic) {
            handlers.retain(|(id, _)| *id != self.id);
            if handlers.is_empty() {
                registry.handlers.remove(&self.topic);
            }
        }
        log::debug!("注销推送主题 {} (#{})", self.topic, self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}
