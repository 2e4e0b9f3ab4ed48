use url::Url;

use super::{ResolvedSource, SiteAdapter};
use crate::error::ExtractionError;

const MEDIA_EXTENSIONS: &[&str] = &["m3u8", "mpd", "mp4", "m4v", "ts"];

/// 任务地址本身就是媒体清单或媒体文件
pub struct DirectMediaAdapter;

impl SiteAdapter for DirectMediaAdapter {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn can_handle(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .map_or(false, |(_, ext)| {
                MEDIA_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m))
            })
    }

    fn needs_page(&self) -> bool {
        false
    }

    fn extract(&self, page_url: &Url, _page: &str) -> Result<ResolvedSource, ExtractionError> {
        Ok(ResolvedSource {
            media_url: page_url.to_string(),
            subtitle_url: None,
        })
    }
}
