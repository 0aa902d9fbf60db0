//! 购物意图抽取：关键词表 + 正则的无状态分类器
//!
//! 从自然语言请求中识别品类、尺码、颜色、价格上限、性别、品牌与剩余关键词，并给出 0–100 的置信度。
//! 置信度低于 MIN_CONFIDENCE 的请求不应进入自动化。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// 可执行的最低置信度
pub const MIN_CONFIDENCE: u8 = 30;

const CATEGORIES: &[(&str, &[&str])] = &[
    ("shoes", &["shoes", "shoe", "sneakers", "sneaker", "boots", "sandals", "trainers", "heels"]),
    ("shirts", &["shirt", "shirts", "t-shirt", "tshirt", "tee", "blouse", "polo"]),
    ("pants", &["pants", "jeans", "trousers", "shorts", "leggings", "chinos"]),
    ("dresses", &["dress", "dresses", "gown", "skirt"]),
    ("jackets", &["jacket", "jackets", "coat", "hoodie", "sweater", "cardigan", "blazer"]),
    ("bags", &["bag", "bags", "backpack", "handbag", "purse", "wallet"]),
    ("accessories", &["hat", "cap", "belt", "scarf", "sunglasses", "watch", "socks"]),
    ("electronics", &["phone", "laptop", "headphones", "earbuds", "charger", "tablet", "camera"]),
];

const COLORS: &[&str] = &[
    "black", "white", "red", "blue", "green", "yellow", "pink", "purple", "orange", "brown",
    "grey", "gray", "navy", "beige", "silver", "gold",
];

const SIZES: &[&str] = &["xxs", "xs", "s", "m", "l", "xl", "xxl", "xxxl", "small", "medium", "large"];

const BRANDS: &[&str] = &[
    "nike", "adidas", "puma", "reebok", "zara", "uniqlo", "levi's", "levis", "gucci", "apple",
    "samsung", "sony", "h&m", "new balance", "converse", "vans",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "i", "me", "my", "want", "need", "buy", "find", "get", "some", "for", "to",
    "in", "with", "and", "or", "of", "please", "size", "under", "below", "less", "than", "dollars",
    "dollar", "usd", "add", "cart", "that", "is", "are", "pair", "cheap", "max", "maximum", "up",
];

/// 解析结果
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ShoppingIntent {
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub max_price: Option<f64>,
    pub gender: Option<String>,
    pub brand: Option<String>,
    pub keywords: Vec<String>,
    /// 0–100
    pub confidence: u8,
}

impl ShoppingIntent {
    pub fn is_actionable(&self) -> bool {
        self.confidence >= MIN_CONFIDENCE
    }

    /// 拼成站内搜索词
    pub fn search_query(&self) -> String {
        let mut parts: Vec<&str> = [&self.brand, &self.gender, &self.color]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        parts.extend(self.keywords.iter().map(String::as_str));
        if let Some(c) = &self.category {
            if !self.keywords.iter().any(|k| k == c) {
                parts.push(c);
            }
        }
        parts.join(" ")
    }
}

fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:under|below|less\s+than|cheaper\s+than|max(?:imum)?|up\s+to|<)\s*\$?\s*(\d+(?:\.\d+)?)\s*(?:\$|dollars?|usd)?",
        )
        .expect("price regex is valid")
    })
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bsize\s+([a-z0-9.]+)\b").expect("size regex is valid")
    })
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '&' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// 无状态抽取器
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentExtractor;

impl IntentExtractor {
    pub fn parse(text: &str) -> ShoppingIntent {
        let lower = text.to_lowercase();
        let words = tokens(&lower);
        let mut intent = ShoppingIntent::default();
        let mut consumed: Vec<String> = Vec::new();

        intent.max_price = price_regex()
            .captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());
        let price_digits = price_regex()
            .captures(&lower)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        intent.category = CATEGORIES.iter().find_map(|(name, words_for)| {
            words
                .iter()
                .find(|w| words_for.contains(&w.as_str()))
                .map(|w| {
                    consumed.push(w.clone());
                    name.to_string()
                })
        });

        intent.color = words
            .iter()
            .find(|w| COLORS.contains(&w.as_str()))
            .map(|w| {
                consumed.push(w.clone());
                if w == "gray" { "grey".to_string() } else { w.clone() }
            });

        intent.brand = BRANDS
            .iter()
            .find(|b| {
                if b.contains(' ') {
                    lower.contains(*b)
                } else {
                    words.iter().any(|w| w == *b)
                }
            })
            .map(|b| {
                consumed.extend(b.split(' ').map(String::from));
                b.to_string()
            });

        intent.gender = words.iter().find_map(|w| {
            let g = match w.as_str() {
                "men" | "men's" | "mens" | "male" | "man" => "men",
                "women" | "women's" | "womens" | "female" | "woman" | "ladies" => "women",
                "kids" | "kid's" | "children" | "boys" | "girls" => "kids",
                _ => return None,
            };
            consumed.push(w.clone());
            Some(g.to_string())
        });

        intent.size = size_regex()
            .captures(&lower)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                words
                    .iter()
                    .find(|w| SIZES.contains(&w.as_str()) && w.len() > 1)
                    .cloned()
            });
        if let Some(size) = &intent.size {
            consumed.push(size.clone());
        }

        intent.keywords = words
            .iter()
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .filter(|w| !consumed.contains(w))
            .filter(|w| Some(w.as_str()) != price_digits.as_deref())
            .filter(|w| w.chars().any(char::is_alphabetic))
            .cloned()
            .collect();

        intent.confidence = Self::score(&intent);
        intent
    }

    fn score(intent: &ShoppingIntent) -> u8 {
        let mut score: u32 = 0;
        if intent.category.is_some() {
            score += 40;
        }
        if intent.brand.is_some() {
            score += 15;
        }
        if intent.color.is_some() {
            score += 10;
        }
        if intent.size.is_some() {
            score += 10;
        }
        if intent.max_price.is_some() {
            score += 10;
        }
        if intent.gender.is_some() {
            score += 5;
        }
        score += (intent.keywords.len() as u32 * 5).min(10);
        score.min(100) as u8
    }
}
