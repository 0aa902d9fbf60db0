//! 工具层：动作模型、定位器、页面抽象与实现、动作执行器、决策函数 schema

pub mod action;
pub mod executor;
pub mod locator;
pub mod memory_page;
pub mod page;
pub mod schema;

#[cfg(feature = "browser")]
pub mod browser;

pub use action::{
    ActionKind, ActionRequest, ActionResult, Decision, InputSummary, LinkSummary, PageExtraction,
    PageSummary, WHOLE_DOCUMENT,
};
pub use executor::{ActionExecutor, ActionLogEntry, ExecutorSettings};
pub use locator::{resolve_all, resolve_one, Locator};
pub use memory_page::{El, InMemoryPage, Interaction};
pub use page::{normalize_text, DomEvent, ElementRef, Page, PageError};
pub use schema::{decision_function, DecisionArgs, DECISION_FUNCTION};

#[cfg(feature = "browser")]
pub use browser::ChromePage;
