//! 执行上下文宿主
//!
//! ContextHost 把请求送到承载目标页面的执行上下文（标签页内的自动化脚本），并负责「重新注入」。
//! LocalContextHost 是进程内实现：每个上下文持有一个 ActionExecutor 与注入状态，
//! invalidate 用于模拟页面从缓存恢复 / 脚本被驱逐。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::{ActionExecutor, ActionRequest, ActionResult, ExecutorSettings, Page, PageError};

/// 执行上下文标识（标签页 id）
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 投递失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Receiving end does not exist in context {0}")]
    ReceiverMissing(ContextId),

    #[error("Execution context {0} was invalidated")]
    ContextInvalidated(ContextId),

    #[error("Unknown execution context: {0}")]
    UnknownContext(ContextId),

    #[error("Injection into {0} failed: {1}")]
    InjectionFailed(ContextId, String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// 投递失败后的恢复步骤
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// 重新注入自动化脚本后退避重试
    Reinject,
    /// 直接退避重试
    Backoff,
    /// 不可恢复
    Fatal,
}

impl TransportError {
    /// 页面层错误到投递错误的映射：脚本缺失 / 上下文销毁可通过重新注入恢复
    pub fn from_page(context: &ContextId, err: PageError) -> Self {
        match err {
            PageError::NotInjected => TransportError::ReceiverMissing(context.clone()),
            PageError::ContextDestroyed => TransportError::ContextInvalidated(context.clone()),
            other => TransportError::Delivery(other.to_string()),
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            TransportError::ReceiverMissing(_) | TransportError::ContextInvalidated(_) => {
                Recovery::Reinject
            }
            TransportError::InjectionFailed(..) | TransportError::Delivery(_) => Recovery::Backoff,
            TransportError::UnknownContext(_) => Recovery::Fatal,
        }
    }
}

/// 执行上下文宿主 trait
#[async_trait]
pub trait ContextHost: Send + Sync {
    /// 把请求交给上下文内的执行器并等待结果
    async fn deliver(
        &self,
        context: &ContextId,
        request: &ActionRequest,
    ) -> Result<ActionResult, TransportError>;

    /// （重新）注入自动化脚本
    async fn inject(&self, context: &ContextId) -> Result<(), TransportError>;
}

struct Slot {
    executor: Arc<ActionExecutor>,
    injected: bool,
}

/// 进程内宿主
#[derive(Default)]
pub struct LocalContextHost {
    slots: Mutex<HashMap<ContextId, Slot>>,
    evict_on_navigate: bool,
    injections: AtomicUsize,
    deliveries: AtomicUsize,
}

impl LocalContextHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// navigate 成功后把上下文标记为未注入（模拟真实页面跳转后内容脚本消失）
    pub fn evict_on_navigate(mut self, yes: bool) -> Self {
        self.evict_on_navigate = yes;
        self
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<ContextId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册一个页面并视为已注入
    pub fn register(&self, context: ContextId, page: Arc<dyn Page>, settings: ExecutorSettings) {
        let executor = Arc::new(ActionExecutor::new(page, settings));
        self.slots().insert(
            context,
            Slot {
                executor,
                injected: true,
            },
        );
    }

    /// 模拟脚本被驱逐（页面从 bfcache 恢复等）
    pub fn invalidate(&self, context: &ContextId) {
        if let Some(slot) = self.slots().get_mut(context) {
            slot.injected = false;
        }
    }

    pub fn remove(&self, context: &ContextId) {
        self.slots().remove(context);
    }

    pub fn executor(&self, context: &ContextId) -> Option<Arc<ActionExecutor>> {
        self.slots().get(context).map(|s| s.executor.clone())
    }

    pub fn injection_count(&self) -> usize {
        self.injections.load(Ordering::SeqCst)
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }

    fn mark(&self, context: &ContextId, injected: bool) {
        if let Some(slot) = self.slots().get_mut(context) {
            slot.injected = injected;
        }
    }
}

#[async_trait]
impl ContextHost for LocalContextHost {
    async fn deliver(
        &self,
        context: &ContextId,
        request: &ActionRequest,
    ) -> Result<ActionResult, TransportError> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        let executor = {
            let slots = self.slots();
            let slot = slots
                .get(context)
                .ok_or_else(|| TransportError::UnknownContext(context.clone()))?;
            if !slot.injected {
                return Err(TransportError::ReceiverMissing(context.clone()));
            }
            slot.executor.clone()
        };

        match executor.execute(request).await {
            Ok(result) => {
                if self.evict_on_navigate && matches!(request, ActionRequest::Navigate { .. }) && result.success {
                    self.mark(context, false);
                }
                Ok(result)
            }
            Err(e) => {
                if e.is_context_loss() {
                    self.mark(context, false);
                }
                Err(TransportError::from_page(context, e))
            }
        }
    }

    async fn inject(&self, context: &ContextId) -> Result<(), TransportError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(context)
            .ok_or_else(|| TransportError::UnknownContext(context.clone()))?;
        slot.injected = true;
        self.injections.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(context = %context, "automation script injected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{DomEvent, El, ElementRef, InMemoryPage};

    fn host_with_page() -> (LocalContextHost, ContextId) {
        let host = LocalContextHost::new();
        let ctx = ContextId::from("tab-1");
        let page = InMemoryPage::new("https://shop.test", "Shop", vec![El::new("h1").text("Deals")]);
        host.register(ctx.clone(), Arc::new(page), ExecutorSettings::immediate());
        (host, ctx)
    }

    fn read_h1() -> ActionRequest {
        ActionRequest::ReadText {
            target: Some("h1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_unknown_context_is_fatal() {
        let (host, _) = host_with_page();
        let err = host.deliver(&ContextId::from("nope"), &read_h1()).await.unwrap_err();
        assert_eq!(err.recovery(), Recovery::Fatal);
    }

    #[tokio::test]
    async fn test_invalidated_context_needs_reinjection() {
        let (host, ctx) = host_with_page();
        host.invalidate(&ctx);
        let err = host.deliver(&ctx, &read_h1()).await.unwrap_err();
        assert_eq!(err, TransportError::ReceiverMissing(ctx.clone()));
        assert_eq!(err.recovery(), Recovery::Reinject);

        host.inject(&ctx).await.unwrap();
        let result = host.deliver(&ctx, &read_h1()).await.unwrap();
        assert!(result.success);
        assert_eq!(host.injection_count(), 1);
    }

    #[tokio::test]
    async fn test_navigation_evicts_script_when_enabled() {
        let host = LocalContextHost::new().evict_on_navigate(true);
        let ctx = ContextId::from("tab-1");
        host.register(
            ctx.clone(),
            Arc::new(InMemoryPage::new("about:blank", "", vec![])),
            ExecutorSettings::immediate(),
        );
        let nav = ActionRequest::Navigate {
            url: "https://shop.test".to_string(),
        };
        assert!(host.deliver(&ctx, &nav).await.unwrap().success);
        assert!(matches!(
            host.deliver(&ctx, &read_h1()).await,
            Err(TransportError::ReceiverMissing(_))
        ));
    }

    /// JS 上下文已销毁的页面
    struct DestroyedPage;

    #[async_trait]
    impl Page for DestroyedPage {
        async fn url(&self) -> Result<String, PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn title(&self) -> Result<String, PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn query_all(&self, _: &str, _: Option<&ElementRef>) -> Result<Vec<ElementRef>, PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn navigate(&self, _: &str) -> Result<(), PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn scroll_into_view(&self, _: &ElementRef) -> Result<(), PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn activate(&self, _: &ElementRef) -> Result<(), PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn focus(&self, _: &ElementRef) -> Result<(), PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn set_value(&self, _: &ElementRef, _: &str) -> Result<(), PageError> {
            Err(PageError::ContextDestroyed)
        }
        async fn dispatch(&self, _: &ElementRef, _: DomEvent) -> Result<(), PageError> {
            Err(PageError::ContextDestroyed)
        }
    }

    #[tokio::test]
    async fn test_destroyed_context_maps_to_invalidated() {
        let host = LocalContextHost::new();
        let ctx = ContextId::from("tab-2");
        host.register(ctx.clone(), Arc::new(DestroyedPage), ExecutorSettings::immediate());
        let err = host.deliver(&ctx, &read_h1()).await.unwrap_err();
        assert_eq!(err, TransportError::ContextInvalidated(ctx.clone()));
        assert_eq!(host.executor(&ctx).unwrap().action_log().len(), 1);
    }
}
