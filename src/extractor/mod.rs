//! 从课程页面解析出真实的媒体流地址和字幕地址。
//!
//! 每个站点一个 [`SiteAdapter`]，按顺序用 `can_handle` 选择；
//! 页面下载由 [`PageExtractor`] 统一完成。

mod direct;
mod embedded_json;

pub use direct::DirectMediaAdapter;
pub use embedded_json::EmbeddedJsonAdapter;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use url::Url;

use crate::error::ExtractionError;

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub media_url: String,
    pub subtitle_url: Option<String>,
}

/// 站点适配器
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, url: &Url) -> bool;

    /// 返回 false 时不下载页面，`extract` 收到空字符串
    fn needs_page(&self) -> bool {
        true
    }

    fn extract(&self, page_url: &Url, page: &str) -> Result<ResolvedSource, ExtractionError>;
}

/// 任务执行器依赖的提取接口
#[async_trait]
pub trait Extract: Send + Sync {
    async fn extract(&self, page_url: &str) -> Result<ResolvedSource, ExtractionError>;
}

pub struct PageExtractor {
    client: Client,
    adapters: Vec<Box<dyn SiteAdapter>>,
}

impl PageExtractor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            adapters: Vec::new(),
        }
    }

    /// 内置适配器：直链优先，其次是页面内嵌JSON
    pub fn with_default_adapters(client: Client) -> Self {
        let mut extractor = Self::new(client);
        extractor.add_adapter(Box::new(DirectMediaAdapter));
        extractor.add_adapter(Box::new(EmbeddedJsonAdapter));
        extractor
    }

    pub fn add_adapter(&mut self, adapter: Box<dyn SiteAdapter>) {
        self.adapters.push(adapter);
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, ExtractionError> {
        let request_error = |source: reqwest::Error| {
            if source.is_timeout() {
                ExtractionError::Timeout(url.to_string())
            } else {
                ExtractionError::Request {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?;
        response.text().await.map_err(request_error)
    }
}

#[async_trait]
impl Extract for PageExtractor {
    async fn extract(&self, page_url: &str) -> Result<ResolvedSource, ExtractionError> {
        let url = Url::parse(page_url).map_err(|source| ExtractionError::InvalidUrl {
            url: page_url.to_string(),
            source,
        })?;

        let adapter = self
            .adapters
            .iter()
            .find(|a| a.can_handle(&url))
            .ok_or_else(|| ExtractionError::Unsupported(page_url.to_string()))?;
        debug!("Using adapter {} for {}", adapter.name(), url);

        let page = if adapter.needs_page() {
            self.fetch_page(&url).await?
        } else {
            String::new()
        };

        let resolved = adapter.extract(&url, &page)?;
        info!("Found source URL: {}", resolved.media_url);
        if let Some(subtitle) = &resolved.subtitle_url {
            info!("Found caption URL: {}", subtitle);
        }
        Ok(resolved)
    }
}

/// 相对地址按页面地址解析
fn resolve_against(page_url: &Url, raw: &str) -> Option<String> {
    page_url.join(raw).ok().map(|u| u.to_string())
}
