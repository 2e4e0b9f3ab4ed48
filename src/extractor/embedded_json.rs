use log::debug;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::{resolve_against, ResolvedSource, SiteAdapter};
use crate::error::ExtractionError;

/// 播放器配置以 `<script type="application/json">` 嵌入页面的站点
pub struct EmbeddedJsonAdapter;

impl SiteAdapter for EmbeddedJsonAdapter {
    fn name(&self) -> &'static str {
        "embedded-json"
    }

    fn can_handle(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    fn extract(&self, page_url: &Url, page: &str) -> Result<ResolvedSource, ExtractionError> {
        let selector = Selector::parse(r#"script[type="application/json"]"#).map_err(|e| {
            ExtractionError::UnexpectedContent {
                url: page_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let document = Html::parse_document(page);

        let mut source = None;
        let mut caption = None;

        for script in document.select(&selector) {
            let text: String = script.text().collect();
            let data: Value = match serde_json::from_str(&text) {
                Ok(data) => data,
                Err(e) => {
                    debug!("Skipping unparseable script block on {}: {}", page_url, e);
                    continue;
                }
            };

            source = source.or_else(|| find_source(&data));
            caption = caption.or_else(|| find_captions(&data));
            if source.is_some() && caption.is_some() {
                break;
            }
        }

        let source = source.ok_or_else(|| ExtractionError::NoMediaSource(page_url.to_string()))?;
        let media_url = resolve_against(page_url, &source).ok_or_else(|| {
            ExtractionError::UnexpectedContent {
                url: page_url.to_string(),
                reason: format!("unusable source value {:?}", source),
            }
        })?;
        let subtitle_url = caption.and_then(|c| resolve_against(page_url, &c));

        Ok(ResolvedSource {
            media_url,
            subtitle_url,
        })
    }
}

/// 深度优先查找第一个 `"source"` 字符串
fn find_source(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("source") {
                if !s.is_empty() {
                    return Some(s.clone());
                }
            }
            map.values().find_map(find_source)
        }
        Value::Array(items) => items.iter().find_map(find_source),
        _ => None,
    }
}

/// 查找 `"captions"` 数组中第一条字幕的 `src`
fn find_captions(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let first_src = map
                .get("captions")
                .and_then(Value::as_array)
                .and_then(|captions| captions.first())
                .and_then(|c| c.get("src"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            if let Some(src) = first_src {
                return Some(src.to_string());
            }
            map.values().find_map(find_captions)
        }
        Value::Array(items) => items.iter().find_map(find_captions),
        _ => None,
    }
}
