//! # 本地偏好存储
//!
//! 主题偏好以字符串形式保存在 `preferences.json`（`tauri-plugin-store`）的 `theme` 键下。
//! 插件存储无法打开时（以及测试中）使用内存实现。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tauri::Runtime;
use tauri_plugin_store::Store;

/// 偏好存储文件名
pub const PREFERENCES_FILE: &str = "preferences.json";

/// 主题偏好的键
pub const THEME_KEY: &str = "theme";

/// 键值偏好存储
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// 写入并落盘
    ///
    /// # 错误
    /// 持久化失败时返回错误，调用方据此回滚
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// 内存偏好存储
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, String>>,
    #[cfg(test)]
    pub fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        #[cfg(test)]
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err("写入偏好失败: 磁盘不可写".to_string());
        }

        let mut values = self
            .values
            .write()
            .map_err(|e| format!("写入偏好失败: {}", e))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// 基于 `tauri-plugin-store` 的持久化偏好存储
pub struct TauriPreferenceStore<R: Runtime> {
    store: Arc<Store<R>>,
}

impl<R: Runtime> TauriPreferenceStore<R> {
    pub fn new(store: Arc<Store<R>>) -> Self {
        Self { store }
    }
}

impl<R: Runtime> PreferenceStore for TauriPreferenceStore<R> {
    fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key)? {
            serde_json::Value::String(value) => Some(value),
            other => {
                log::warn!("偏好 {} 不是字符串，忽略: {}", key, other);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.store.set(key, value);
        self.store
            .save()
            .map_err(|e| format!("保存偏好文件失败: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn memory_store_round_trips_and_reports_failures() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(store.get(THEME_KEY), None);

        store.set(THEME_KEY, "dark").unwrap();
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("dark"));

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(store.set(THEME_KEY, "light").is_err());
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("dark"));
    }
}
