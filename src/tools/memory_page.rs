//! 进程内页面（InMemoryPage）
//!
//! 用 `El` 搭出的元素树渲染成 HTML，再交给 `scraper` 解析与匹配选择器，CSS 语义与浏览器一致
//! （属性选择器、`>` 子代组合、选择器列表等）。每个元素渲染时带上 `data-cp-node` 标识，
//! 解析后据此映射回稳定的节点 id。
//! 记录点击、赋值与事件，供测试断言；可为 URL 注册路由，导航时替换 body。

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Mutex;

use async_trait::async_trait;
use scraper::{ElementRef as HtmlElement, Html, Selector};

use crate::tools::page::{normalize_text, DomEvent, ElementRef, Page, PageError};

/// 节点标识属性，不出现在返回的 ElementRef 中
const NODE_ATTR: &str = "data-cp-node";

/// 构建页面用的元素描述
#[derive(Clone, Debug, Default)]
pub struct El {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<El>,
}

impl El {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(&class);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn child(mut self, child: El) -> Self {
        self.children.push(child);
        self
    }
}

/// 页面交互记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Navigate(String),
    Scroll(u64),
    Click(u64),
    Focus(u64),
    SetValue(u64, String),
    Event(u64, &'static str),
}

/// 已挂载的元素：El 加上分配好的 id
#[derive(Debug)]
struct Node {
    id: u64,
    el: El,
    children: Vec<Node>,
}

#[derive(Debug, Default)]
struct Dom {
    url: String,
    title: String,
    body: Option<Node>,
    /// 当前挂载节点的 value（初始取自 value 属性）
    values: HashMap<u64, String>,
    next_id: u64,
    routes: HashMap<String, (String, Vec<El>)>,
    interactions: Vec<Interaction>,
}

fn escape_text(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn node_id(el: &HtmlElement<'_>) -> Option<u64> {
    el.value().attr(NODE_ATTR)?.parse().ok()
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|_| PageError::InvalidSelector(selector.to_string()))
}

impl Dom {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn mount_body(&mut self, children: &[El]) {
        self.values.clear();
        let body = El {
            tag: "body".to_string(),
            children: children.to_vec(),
            ..Default::default()
        };
        let node = self.mount(body);
        self.body = Some(node);
    }

    fn mount(&mut self, mut el: El) -> Node {
        let id = self.alloc();
        if let Some(value) = el.attributes.remove("value") {
            self.values.insert(id, value);
        }
        let children = std::mem::take(&mut el.children)
            .into_iter()
            .map(|child| self.mount(child))
            .collect();
        Node { id, el, children }
    }

    fn render(&self) -> String {
        let mut html = String::from("<!DOCTYPE html><html><head></head>");
        if let Some(body) = &self.body {
            self.render_node(body, &mut html);
        }
        html.push_str("</html>");
        html
    }

    fn render_node(&self, node: &Node, out: &mut String) {
        let _ = write!(out, "<{} {}=\"{}\"", node.el.tag, NODE_ATTR, node.id);
        for (name, value) in &node.el.attributes {
            let _ = write!(out, " {}=\"", name);
            escape_attr(value, out);
            out.push('"');
        }
        if let Some(value) = self.values.get(&node.id).filter(|v| !v.is_empty()) {
            out.push_str(" value=\"");
            escape_attr(value, out);
            out.push('"');
        }
        out.push('>');
        escape_text(&node.el.text, out);
        for child in &node.children {
            self.render_node(child, out);
        }
        let _ = write!(out, "</{}>", node.el.tag);
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.render())
    }

    /// 文档顺序的命中节点 id；scope 限定在该节点的后代内
    fn select_ids(&self, selector: &str, scope: Option<u64>) -> Result<Vec<u64>, PageError> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        let ids = match scope {
            Some(scope) => {
                let root = find(&document, scope).ok_or(PageError::StaleElement(scope))?;
                root.select(&selector).filter_map(|e| node_id(&e)).collect()
            }
            None => document
                .select(&selector)
                .filter_map(|e| node_id(&e))
                .collect(),
        };
        Ok(ids)
    }

    fn element_refs(&self, ids: &[u64]) -> Vec<ElementRef> {
        let document = self.document();
        ids.iter()
            .filter_map(|id| find(&document, *id))
            .filter_map(|e| to_element_ref(&e))
            .collect()
    }

    fn text_of(&self, id: u64) -> Option<String> {
        let document = self.document();
        find(&document, id).map(|e| element_text(&e))
    }

    fn attr_of(&self, id: u64, name: &str) -> Result<Option<String>, PageError> {
        let document = self.document();
        let el = find(&document, id).ok_or(PageError::StaleElement(id))?;
        Ok(el.value().attr(name).map(String::from))
    }

    fn check(&self, element: &ElementRef) -> Result<(), PageError> {
        self.attr_of(element.id, NODE_ATTR).map(|_| ())
    }
}

fn find(document: &Html, id: u64) -> Option<HtmlElement<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(HtmlElement::wrap)
        .find(|e| node_id(e) == Some(id))
}

fn element_text(el: &HtmlElement<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn to_element_ref(el: &HtmlElement<'_>) -> Option<ElementRef> {
    let id = node_id(el)?;
    let attributes = el
        .value()
        .attrs()
        .filter(|(name, _)| *name != NODE_ATTR)
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    Some(ElementRef {
        id,
        tag: el.value().name().to_string(),
        text: element_text(el),
        attributes,
    })
}

/// 进程内页面
#[derive(Debug)]
pub struct InMemoryPage {
    dom: Mutex<Dom>,
}

impl InMemoryPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>, body: Vec<El>) -> Self {
        let mut dom = Dom {
            url: url.into(),
            title: title.into(),
            ..Default::default()
        };
        dom.mount_body(&body);
        Self {
            dom: Mutex::new(dom),
        }
    }

    /// 导航到 url 时替换 body 与标题
    pub fn with_route(self, url: impl Into<String>, title: impl Into<String>, body: Vec<El>) -> Self {
        self.lock().routes.insert(url.into(), (title.into(), body));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Dom> {
        self.dom.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.lock().interactions.clone()
    }

    /// 被点击元素的文本；导航后已卸载的节点不计入
    pub fn clicked_texts(&self) -> Vec<String> {
        let dom = self.lock();
        dom.interactions
            .iter()
            .filter_map(|i| match i {
                Interaction::Click(id) => dom.text_of(*id),
                _ => None,
            })
            .collect()
    }

    /// 第一个匹配元素的当前 value
    pub fn value_of(&self, selector: &str) -> Option<String> {
        let dom = self.lock();
        let id = dom.select_ids(selector, None).ok()?.into_iter().next()?;
        Some(dom.values.get(&id).cloned().unwrap_or_default())
    }

    pub fn current_url(&self) -> String {
        self.lock().url.clone()
    }
}

#[async_trait]
impl Page for InMemoryPage {
    async fn url(&self) -> Result<String, PageError> {
        Ok(self.lock().url.clone())
    }

    async fn title(&self) -> Result<String, PageError> {
        Ok(self.lock().title.clone())
    }

    async fn query_all(
        &self,
        selector: &str,
        scope: Option<&ElementRef>,
    ) -> Result<Vec<ElementRef>, PageError> {
        let dom = self.lock();
        let ids = dom.select_ids(selector, scope.map(|s| s.id))?;
        Ok(dom.element_refs(&ids))
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut dom = self.lock();
        dom.interactions.push(Interaction::Navigate(url.to_string()));
        dom.url = url.to_string();
        if let Some((title, body)) = dom.routes.get(url).cloned() {
            dom.title = title;
            dom.mount_body(&body);
        }
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<(), PageError> {
        let mut dom = self.lock();
        dom.check(element)?;
        dom.interactions.push(Interaction::Scroll(element.id));
        Ok(())
    }

    async fn activate(&self, element: &ElementRef) -> Result<(), PageError> {
        let follow = {
            let mut dom = self.lock();
            let href = dom.attr_of(element.id, "href")?;
            dom.interactions.push(Interaction::Click(element.id));
            href.filter(|h| dom.routes.contains_key(h))
        };
        // 链接点击跟随已注册路由的 href
        if let Some(href) = follow {
            self.navigate(&href).await?;
        }
        Ok(())
    }

    async fn focus(&self, element: &ElementRef) -> Result<(), PageError> {
        let mut dom = self.lock();
        dom.check(element)?;
        dom.interactions.push(Interaction::Focus(element.id));
        Ok(())
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<(), PageError> {
        let mut dom = self.lock();
        dom.check(element)?;
        dom.values.insert(element.id, value.to_string());
        dom.interactions
            .push(Interaction::SetValue(element.id, value.to_string()));
        Ok(())
    }

    async fn dispatch(&self, element: &ElementRef, event: DomEvent) -> Result<(), PageError> {
        let mut dom = self.lock();
        dom.check(element)?;
        dom.interactions.push(Interaction::Event(element.id, event.as_str()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop() -> InMemoryPage {
        InMemoryPage::new(
            "https://shop.example.com",
            "Shop",
            vec![
                El::new("h1").text("Summer Sale"),
                El::new("div")
                    .class("product")
                    .id("p1")
                    .child(El::new("span").class("name").text("Red Shirt"))
                    .child(El::new("button").class("buy btn").text("Add to Cart")),
                El::new("div")
                    .class("product")
                    .child(El::new("span").class("name").text("Blue Jeans"))
                    .child(El::new("button").class("buy").text("Add to Cart")),
                El::new("input")
                    .attr("type", "text")
                    .attr("name", "q")
                    .attr("placeholder", "Search shoes"),
            ],
        )
    }

    #[tokio::test]
    async fn test_query_by_tag_class_and_id() {
        let page = shop();
        assert_eq!(page.query_all("h1", None).await.unwrap().len(), 1);
        assert_eq!(page.query_all("button.buy", None).await.unwrap().len(), 2);
        assert_eq!(page.query_all("button.buy.btn", None).await.unwrap().len(), 1);
        assert_eq!(page.query_all("#p1 span", None).await.unwrap()[0].text, "Red Shirt");
        assert_eq!(page.query_all("input[name=q]", None).await.unwrap().len(), 1);
        assert!(page.query_all(".missing", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quoted_attribute_value_with_space() {
        let page = shop();
        let found = page
            .query_all(r#"input[placeholder="Search shoes"]"#, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attributes.get("name").map(String::as_str), Some("q"));
        assert!(!found[0].attributes.contains_key(NODE_ATTR));
    }

    #[tokio::test]
    async fn test_child_combinator_skips_grandchildren() {
        let page = InMemoryPage::new(
            "https://shop.example.com",
            "Shop",
            vec![El::new("div")
                .class("row")
                .child(El::new("button").text("Direct"))
                .child(El::new("span").child(El::new("button").text("Nested")))],
        );
        let direct = page.query_all("div.row > button", None).await.unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].text, "Direct");
        assert_eq!(page.query_all("div.row button", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_selector_list_keeps_document_order() {
        let page = shop();
        let els = page.query_all("input, h1", None).await.unwrap();
        assert_eq!(els[0].tag, "h1");
        assert_eq!(els[1].tag, "input");
    }

    #[tokio::test]
    async fn test_scoped_query() {
        let page = shop();
        let products = page.query_all("div.product", None).await.unwrap();
        let inner = page.query_all("button", Some(&products[1])).await.unwrap();
        assert_eq!(inner.len(), 1);
        assert!(products[1].text.contains("Blue Jeans"));
    }

    #[tokio::test]
    async fn test_body_text_includes_descendants() {
        let page = shop();
        let body = page.query_all("body", None).await.unwrap();
        assert!(body[0].text.starts_with("Summer Sale Red Shirt Add to Cart"));
    }

    #[tokio::test]
    async fn test_invalid_selector() {
        let page = shop();
        let err = page.query_all("button[", None).await.unwrap_err();
        assert!(matches!(err, PageError::InvalidSelector(_)));
    }

    #[tokio::test]
    async fn test_set_value_is_visible_to_selectors() {
        let page = shop();
        let input = page.query_all("input", None).await.unwrap().remove(0);
        page.set_value(&input, "trail shoes").await.unwrap();
        assert_eq!(page.value_of("input[name=q]").as_deref(), Some("trail shoes"));
        let matched = page
            .query_all(r#"input[value="trail shoes"]"#, None)
            .await
            .unwrap();
        assert_eq!(matched[0].id, input.id);
    }

    #[tokio::test]
    async fn test_text_is_escaped_not_parsed() {
        let page = InMemoryPage::new(
            "https://shop.example.com",
            "Shop",
            vec![El::new("p").attr("title", "5\" screen").text("<b>bold</b> & more")],
        );
        let p = page.query_all("p", None).await.unwrap().remove(0);
        assert_eq!(p.text, "<b>bold</b> & more");
        assert_eq!(p.attributes.get("title").map(String::as_str), Some("5\" screen"));
        assert!(page.query_all("b", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_route_replaces_body_and_stales_refs() {
        let page = shop().with_route(
            "https://shop.example.com/cart",
            "Cart",
            vec![El::new("h1").text("Your Cart")],
        );
        let old = page.query_all("h1", None).await.unwrap().remove(0);
        page.navigate("https://shop.example.com/cart").await.unwrap();
        assert_eq!(page.title().await.unwrap(), "Cart");
        assert_eq!(page.query_all("h1", None).await.unwrap()[0].text, "Your Cart");
        assert_eq!(page.activate(&old).await, Err(PageError::StaleElement(old.id)));
    }
}
