use serde::Deserialize;
use std::path::Path;

use crate::error::LoadError;

/// 一个下载任务：课程页面地址与标题
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadTask {
    #[serde(rename = "url")]
    pub source_page_url: String,
    pub title: String,
}

impl DownloadTask {
    pub fn new(source_page_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_page_url: source_page_url.into(),
            title: title.into(),
        }
    }
}

/// 从JSON文件载入全部任务，任何条目格式错误都会导致整体失败
pub fn load_tasks(path: &Path) -> Result<Vec<DownloadTask>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tasks(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_tasks(content: &str) -> Result<Vec<DownloadTask>, serde_json::Error> {
    serde_json::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_url_and_title() {
        let tasks = parse_tasks(
            r#"[{"url":"http://x/a","title":"Lec 1: Intro"},{"url":"http://x/b","title":"Lec 2: Intro","extra":1}]"#,
        )
        .unwrap();
        assert_eq!(
            tasks,
            vec![
                DownloadTask::new("http://x/a", "Lec 1: Intro"),
                DownloadTask::new("http://x/b", "Lec 2: Intro"),
            ]
        );
    }

    #[test]
    fn duplicates_are_kept() {
        let tasks = parse_tasks(r#"[{"url":"u","title":"t"},{"url":"u","title":"t"}]"#).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn one_malformed_entry_fails_the_whole_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"url":"u","title":"t"}},{{"url":"u"}}]"#).unwrap();

        let err = load_tasks(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tasks(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
