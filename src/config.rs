//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CARTPILOT__*` 覆盖（双下划线表示嵌套，如 `CARTPILOT__AGENT__MAX_STEPS=6`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::memory::StoreLimits;
use crate::tools::ExecutorSettings;
use crate::transport::RetryPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub transport: TransportSection,
    pub executor: ExecutorSection,
    pub store: StoreSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 数据目录（store 相对路径以此为根）
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "cartpilot".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / scripted
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeout_secs: 60,
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

/// [agent] 段：主循环
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: usize,
    /// 每轮 OBSERVE 之后的固定等待
    pub step_delay_ms: u64,
    /// Task 内保留的历史决策条数
    pub history_window: usize,
    /// 目标中含有这些词的 click 视为提交类（超时按可能成功处理）
    pub submit_keywords: Vec<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_delay_ms: 1000,
            history_window: 10,
            submit_keywords: default_submit_keywords(),
        }
    }
}

fn default_submit_keywords() -> Vec<String> {
    vec!["submit".to_string(), "search".to_string()]
}

/// [transport] 段：投递重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub response_timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 5000,
            response_timeout_secs: 10,
        }
    }
}

impl TransportSection {
    /// 配置值超出上限（5 次 / 5s）时按上限生效
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
        .bounded()
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// [executor] 段：DOM 动作的等待与上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub navigate_settle_ms: u64,
    pub click_settle_ms: u64,
    pub keystroke_delay_ms: u64,
    pub max_text_chars: usize,
    pub summary_limit: usize,
    pub action_log_capacity: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            navigate_settle_ms: 1500,
            click_settle_ms: 300,
            keystroke_delay_ms: 30,
            max_text_chars: 5000,
            summary_limit: 10,
            action_log_capacity: 50,
        }
    }
}

impl ExecutorSection {
    pub fn settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            navigate_settle: Duration::from_millis(self.navigate_settle_ms),
            click_settle: Duration::from_millis(self.click_settle_ms),
            keystroke_delay: Duration::from_millis(self.keystroke_delay_ms),
            max_text_chars: self.max_text_chars,
            summary_limit: self.summary_limit,
            action_log_capacity: self.action_log_capacity,
        }
    }
}

/// [store] 段：键值持久化
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// 相对路径以 app.data_dir 为根
    pub path: PathBuf,
    pub max_successes: usize,
    pub max_chat_messages: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state.json"),
            max_successes: 50,
            max_chat_messages: 100,
        }
    }
}

impl StoreSection {
    pub fn limits(&self) -> StoreLimits {
        StoreLimits {
            max_successes: self.max_successes,
            max_chat_messages: self.max_chat_messages,
        }
    }
}

impl AppConfig {
    /// store 文件的实际路径
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            self.app.data_dir.join(&self.store.path)
        }
    }
}

/// 从 config 目录加载配置，环境变量 CARTPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CARTPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CARTPILOT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("agent.submit_keywords")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 加载失败时告警并使用默认值
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_steps, 10);
        assert_eq!(cfg.transport.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.transport.response_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.executor.settings().max_text_chars, 5000);
        assert_eq!(cfg.store_path(), PathBuf::from("data/state.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\nmax_steps = 4\nsubmit_keywords = [\"go\"]\n\n[transport]\nmax_attempts = 3").unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.agent.max_steps, 4);
        assert_eq!(cfg.agent.submit_keywords, vec!["go"]);
        assert_eq!(cfg.agent.history_window, 10);
        assert_eq!(cfg.transport.max_attempts, 3);
        assert_eq!(cfg.transport.max_delay_ms, 5000);
    }

    #[test]
    fn test_retry_policy_is_clamped() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[transport]\nmax_attempts = 8\nmax_delay_ms = 60000").unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.transport.max_attempts, 8);
        let policy = cfg.transport.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }
}
