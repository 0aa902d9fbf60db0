//! Agent 构建器：按配置组装 Planner / Guard / Recovery / Transport 与控制器
//!
//! CLI 与测试共用同一套组装逻辑；LLM、执行上下文宿主与事件接收方可以注入替换。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{AgentController, AgentError, AgentSettings, RecoveryEngine};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient, ScriptedLlmClient};
use crate::react::{AgentLoop, EventSink, LoopGuard, NullSink, Planner};
use crate::tools::Decision;
use crate::transport::{ContextHost, Transport};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Scripted）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "deepseek" if has_deepseek_key || has_openai_key => {
            tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
            Ok(Arc::new(create_deepseek_client(
                Some(&cfg.llm.model),
                cfg.llm.timeout_secs,
            )?))
        }
        "openai" if has_openai_key => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Ok(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                None,
                cfg.llm.timeout_secs,
            )?))
        }
        "scripted" => Ok(Arc::new(offline_client())),
        "deepseek" | "openai" => {
            tracing::warn!("No API key set for {}, using scripted offline planner", provider);
            Ok(Arc::new(offline_client()))
        }
        other => Err(AgentError::Config(format!("unknown llm provider: {}", other))),
    }
}

/// 离线规划：读一次页面后结束
fn offline_client() -> ScriptedLlmClient {
    ScriptedLlmClient::new()
        .decision(Decision::read_page("offline mode, inspecting the current page"))
        .decision(Decision::finish(
            "Read the current page (offline mode, no planner available)",
            "no LLM configured",
        ))
}

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            sink: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            max_steps: self.config.agent.max_steps,
            history_window: self.config.agent.history_window,
            step_delay: Duration::from_millis(self.config.agent.step_delay_ms),
        }
    }

    /// 组装控制器；host 为动作投递的目标
    pub fn build(self, host: Arc<dyn ContextHost>) -> Result<AgentController, AgentError> {
        let llm = match self.llm.clone() {
            Some(llm) => llm,
            None => create_llm_from_config(&self.config)?,
        };
        let transport = Transport::new(
            host,
            self.config.transport.retry_policy(),
            self.config.transport.response_timeout(),
        );
        let settings = self.settings();
        let agent_loop = AgentLoop::new(
            Planner::new(llm),
            LoopGuard::new(),
            RecoveryEngine::new(self.config.agent.submit_keywords.clone()),
            transport,
            settings.step_delay,
        );
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        Ok(AgentController::new(agent_loop, sink, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_provider_needs_no_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "scripted".to_string();
        assert!(create_llm_from_config(&cfg).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "carrier-pigeon".to_string();
        assert!(matches!(
            create_llm_from_config(&cfg),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_steps = 4;
        cfg.agent.step_delay_ms = 0;
        let settings = AgentBuilder::new(cfg).settings();
        assert_eq!(settings.max_steps, 4);
        assert_eq!(settings.step_delay, Duration::ZERO);
    }
}
