//! 记忆层：任务内对话记录（Transcript）与跨会话键值持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{Message, Role, Transcript};
pub use persistence::{ChatEntry, Credential, StateStore, StoreError, StoreLimits, StoredState, SuccessRecord};
