//! 由任务标题推导出安全且稳定的文件名。
//!
//! 同一标题在任何一次运行中都会得到相同的文件名，
//! 重复运行时据此跳过已完成的任务。

const MAX_NAME_BYTES: usize = 200;
const PLACEHOLDER: &str = "untitled";
const SUBTITLE_PREFIX_CHARS: usize = 3;

/// 清理标题中的非法字符
pub fn sanitize(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_space = false;

    for c in title.chars() {
        let mapped = match c {
            '｜' | '|' | '\\' | '/' | '*' | '?' | '"' | '<' | '>' => Some('_'),
            ':' => None,
            c if c.is_control() => None,
            c if c.is_whitespace() => Some(' '),
            c => Some(c),
        };

        match mapped {
            Some(' ') if prev_space => {}
            Some(' ') => {
                out.push(' ');
                prev_space = true;
            }
            Some(c) => {
                out.push(c);
                prev_space = false;
            }
            None => {}
        }
    }

    let trimmed = truncate(trim_edges(&out), MAX_NAME_BYTES);
    // 截断后末尾可能再次出现空格或点
    let trimmed = trim_edges(trimmed);

    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 视频文件名：`<标题>-acc.mp4`
pub fn video_name(title: &str) -> String {
    format!("{}-acc.mp4", sanitize(title))
}

/// 字幕文件名只取清理后标题的前三个字符。
///
/// 前缀相同的标题会得到相同的字幕文件名。
pub fn subtitle_name(title: &str) -> String {
    let sanitized = sanitize(title);
    let prefix: String = sanitized.chars().take(SUBTITLE_PREFIX_CHARS).collect();
    let prefix = trim_edges(&prefix);
    let prefix = if prefix.is_empty() { PLACEHOLDER } else { prefix };
    format!("{}.vtt", prefix)
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '.')
}

fn truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut take = max_bytes;
    while take > 0 && !s.is_char_boundary(take) {
        take -= 1;
    }
    &s[..take]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lecture_titles() {
        assert_eq!(video_name("Lec 1: Intro"), "Lec 1 Intro-acc.mp4");
        assert_eq!(video_name("Lec 2: Intro"), "Lec 2 Intro-acc.mp4");
    }

    #[test]
    fn subtitle_prefix_collides_for_shared_prefix() {
        // 已知行为：前三个字符相同即冲突
        assert_eq!(subtitle_name("Lec 1: Intro"), "Lec.vtt");
        assert_eq!(subtitle_name("Lec 2: Intro"), "Lec.vtt");
        assert_ne!(video_name("Lec 1: Intro"), video_name("Lec 2: Intro"));
    }

    #[test]
    fn subtitle_prefix_drops_trailing_dot() {
        assert_eq!(subtitle_name("A. Basics"), "A.vtt");
        assert_eq!(subtitle_name("第一講 導論"), "第一講.vtt");
    }

    #[test]
    fn separators_and_reserved_punctuation() {
        assert_eq!(sanitize(r#"a/b\c*d?e"f<g>h|i｜j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize("tab\there\nnewline"), "tab here newline");
        assert_eq!(sanitize("bell\x07"), "bell");
    }

    #[test]
    fn trims_dots_and_spaces() {
        assert_eq!(sanitize("  ..name..  "), "name");
    }

    #[test]
    fn never_empty() {
        assert_eq!(sanitize(""), "untitled");
        assert_eq!(sanitize(" ... "), "untitled");
        assert_eq!(sanitize(":::"), "untitled");
        assert_eq!(subtitle_name(""), "untitled.vtt");
    }

    #[test]
    fn bounded_length_on_char_boundary() {
        let long = "講".repeat(100);
        let out = sanitize(&long);
        assert!(out.len() <= MAX_NAME_BYTES);
        assert!(out.chars().all(|c| c == '講'));
    }

    #[test]
    fn deterministic_and_separator_free() {
        let samples = [
            "Lec 1: Intro",
            "../../etc/passwd",
            "C:\\Windows\\system32",
            "weird \u{0}\u{1f} chars / here",
            "",
            "｜｜｜",
        ];
        for s in samples {
            let first = sanitize(s);
            assert_eq!(first, sanitize(s));
            assert!(!first.contains('/'));
            assert!(!first.contains('\\'));
            assert!(!first.is_empty());
        }
    }
}
