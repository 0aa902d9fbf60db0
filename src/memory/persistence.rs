//! 键值持久化：目标站点偏好、成功记录、聊天记录、按主机名的凭据
//!
//! 单文件 JSON；每次写入都是「读取-修改-整体写回」，后写者覆盖（无事务保证）。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Role;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 一次成功加入购物车的商品
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub name: String,
    pub price: Option<String>,
    pub url: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// 聊天面板中的一条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// 站点登录凭据
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub last_used: DateTime<Utc>,
}

/// 持久化状态整体
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredState {
    pub target_site: Option<String>,
    /// 最新在前
    pub successes: Vec<SuccessRecord>,
    /// 最旧在前
    pub chat: Vec<ChatEntry>,
    pub credentials: BTreeMap<String, Credential>,
}

/// 列表上限
#[derive(Clone, Copy, Debug)]
pub struct StoreLimits {
    pub max_successes: usize,
    pub max_chat_messages: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_successes: 50,
            max_chat_messages: 100,
        }
    }
}

/// JSON 文件存储
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    limits: StoreLimits,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            limits: StoreLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在时返回空状态
    pub fn load(&self) -> Result<StoredState, StoreError> {
        if !self.path.exists() {
            return Ok(StoredState::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(StoredState::default());
        }
        Ok(serde_json::from_str(&data)?)
    }

    /// 整体写回；父目录不存在时自动创建
    pub fn save(&self, state: &StoredState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StoredState)) -> Result<StoredState, StoreError> {
        let mut state = self.load()?;
        f(&mut state);
        self.save(&state)?;
        Ok(state)
    }

    pub fn set_target_site(&self, site: impl Into<String>) -> Result<(), StoreError> {
        let site = site.into();
        self.update(|s| s.target_site = Some(site))?;
        Ok(())
    }

    pub fn record_success(&self, record: SuccessRecord) -> Result<(), StoreError> {
        let max = self.limits.max_successes;
        self.update(|s| {
            s.successes.insert(0, record);
            s.successes.truncate(max);
        })?;
        Ok(())
    }

    pub fn append_chat(&self, role: Role, content: impl Into<String>) -> Result<(), StoreError> {
        let entry = ChatEntry {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        };
        let max = self.limits.max_chat_messages;
        self.update(|s| {
            s.chat.push(entry);
            if s.chat.len() > max {
                let excess = s.chat.len() - max;
                s.chat.drain(..excess);
            }
        })?;
        Ok(())
    }

    pub fn save_credential(
        &self,
        hostname: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), StoreError> {
        let cred = Credential {
            username: username.into(),
            password: password.into(),
            last_used: Utc::now(),
        };
        let host = hostname.to_lowercase();
        self.update(|s| {
            s.credentials.insert(host, cred);
        })?;
        Ok(())
    }

    /// 读取凭据并刷新 last_used
    pub fn use_credential(&self, hostname: &str) -> Result<Option<Credential>, StoreError> {
        let host = hostname.to_lowercase();
        let mut found = None;
        self.update(|s| {
            if let Some(c) = s.credentials.get_mut(&host) {
                c.last_used = Utc::now();
                found = Some(c.clone());
            }
        })?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (_dir, store) = store();
        let state = store.load().unwrap();
        assert!(state.target_site.is_none());
        assert!(state.successes.is_empty());
        assert!(state.chat.is_empty());
    }

    #[test]
    fn test_successes_newest_first_and_capped() {
        let (_dir, store) = store();
        let store = store.with_limits(StoreLimits {
            max_successes: 3,
            max_chat_messages: 100,
        });
        for i in 0..5 {
            store
                .record_success(SuccessRecord {
                    name: format!("item {i}"),
                    price: None,
                    url: None,
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }
        let names: Vec<String> = store.load().unwrap().successes.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["item 4", "item 3", "item 2"]);
    }

    #[test]
    fn test_chat_drops_oldest() {
        let (_dir, store) = store();
        let store = store.with_limits(StoreLimits {
            max_successes: 50,
            max_chat_messages: 2,
        });
        store.append_chat(Role::User, "a").unwrap();
        store.append_chat(Role::Assistant, "b").unwrap();
        store.append_chat(Role::User, "c").unwrap();
        let chat: Vec<String> = store.load().unwrap().chat.into_iter().map(|c| c.content).collect();
        assert_eq!(chat, vec!["b", "c"]);
    }

    #[test]
    fn test_credentials_last_writer_wins() {
        let (_dir, store) = store();
        store.save_credential("Shop.Example.com", "alice", "one").unwrap();
        store.save_credential("shop.example.com", "alice", "two").unwrap();
        let cred = store.use_credential("shop.example.com").unwrap().unwrap();
        assert_eq!(cred.password, "two");
        assert!(store.use_credential("other.com").unwrap().is_none());
    }

    #[test]
    fn test_target_site_roundtrip() {
        let (_dir, store) = store();
        store.set_target_site("amazon").unwrap();
        assert_eq!(store.load().unwrap().target_site.as_deref(), Some("amazon"));
    }
}
