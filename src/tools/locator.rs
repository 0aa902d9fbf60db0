//! 定位器：结构选择器 + 可选的文本内容谓词 + 可选的后代收窄
//!
//! 站点标记的属性不稳定，Planner 常写 `button:contains("Add to Cart")` 或
//! `div:contains('Size M') button`。这里把它解析为显式的 Locator，再由 resolve_* 在 Page 上求值：
//! 1. 结构部分交给页面原生查询；
//! 2. 文本谓词在 Rust 侧过滤（忽略大小写、折叠空白）；
//! 3. 有后代选择器时，在每个命中元素内部继续查询。

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::tools::page::{normalize_text, ElementRef, Page, PageError};

/// 已解析的定位器
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locator {
    /// 结构选择器（为空时按 `*` 处理）
    pub selector: String,
    /// 元素可见文本须包含的内容
    pub contains: Option<String>,
    /// 在命中元素内部继续查询的后代选择器
    pub within: Option<String>,
}

fn contains_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)^(?P<base>.*?):contains\(\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^)]*?))\s*\)(?P<rest>.*)$"#,
        )
        .expect("locator regex is valid")
    })
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            contains: None,
            within: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.contains = Some(text.into());
        self
    }

    pub fn within(mut self, descendant: impl Into<String>) -> Self {
        self.within = Some(descendant.into());
        self
    }

    /// 解析 Planner 给出的原始定位字符串
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(caps) = contains_regex().captures(raw) else {
            return Self::css(raw);
        };
        let base = caps.name("base").map(|m| m.as_str().trim()).unwrap_or("");
        let text = caps
            .name("dq")
            .or_else(|| caps.name("sq"))
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let rest = caps
            .name("rest")
            .map(|m| m.as_str().trim().trim_start_matches('>').trim())
            .unwrap_or("");

        Self {
            selector: if base.is_empty() { "*".to_string() } else { base.to_string() },
            contains: if text.trim().is_empty() { None } else { Some(text) },
            within: if rest.is_empty() { None } else { Some(rest.to_string()) },
        }
    }

    fn matches_text(&self, element: &ElementRef) -> bool {
        match &self.contains {
            None => true,
            Some(needle) => normalize_text(&element.text)
                .to_lowercase()
                .contains(&normalize_text(needle).to_lowercase()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector)?;
        if let Some(text) = &self.contains {
            write!(f, ":contains({:?})", text)?;
        }
        if let Some(within) = &self.within {
            write!(f, " {}", within)?;
        }
        Ok(())
    }
}

/// 求值全部命中元素（文档顺序，去重）
pub async fn resolve_all(page: &dyn Page, locator: &Locator) -> Result<Vec<ElementRef>, PageError> {
    let candidates: Vec<ElementRef> = page
        .query_all(&locator.selector, None)
        .await?
        .into_iter()
        .filter(|el| locator.matches_text(el))
        .collect();

    let Some(within) = &locator.within else {
        return Ok(candidates);
    };

    let mut out: Vec<ElementRef> = Vec::new();
    for scope in &candidates {
        for el in page.query_all(within, Some(scope)).await? {
            if !out.iter().any(|e| e.id == el.id) {
                out.push(el);
            }
        }
    }
    Ok(out)
}

/// 求值单个元素：有文本谓词时取文本最短（最具体）的命中，否则取第一个
pub async fn resolve_one(page: &dyn Page, locator: &Locator) -> Result<Option<ElementRef>, PageError> {
    let matches = resolve_all(page, locator).await?;
    if locator.contains.is_some() && locator.within.is_none() {
        return Ok(matches
            .into_iter()
            .min_by_key(|el| normalize_text(&el.text).chars().count()));
    }
    Ok(matches.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_selector() {
        let loc = Locator::parse("  #add-to-cart ");
        assert_eq!(loc, Locator::css("#add-to-cart"));
    }

    #[test]
    fn test_parse_contains_double_quotes() {
        let loc = Locator::parse(r#"button:contains("Add to Cart")"#);
        assert_eq!(loc.selector, "button");
        assert_eq!(loc.contains.as_deref(), Some("Add to Cart"));
        assert!(loc.within.is_none());
    }

    #[test]
    fn test_parse_contains_with_descendant() {
        let loc = Locator::parse("div.size-row:contains('Size M') > button");
        assert_eq!(loc.selector, "div.size-row");
        assert_eq!(loc.contains.as_deref(), Some("Size M"));
        assert_eq!(loc.within.as_deref(), Some("button"));
    }

    #[test]
    fn test_parse_bare_contains_without_base() {
        let loc = Locator::parse(":contains(Checkout)");
        assert_eq!(loc.selector, "*");
        assert_eq!(loc.contains.as_deref(), Some("Checkout"));
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        let loc = Locator::css("a.item").with_text("Red Shirt").within("span");
        assert_eq!(Locator::parse(&loc.to_string()), loc);
    }
}
