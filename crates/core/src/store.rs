use crate::models::{Document, SearchResult};
use crate::predicate::MatchSettings;
use std::collections::BTreeMap;
use std::path::Path;

/// One hit as returned by the store, before it is shaped for callers.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub id: String,
    pub score: f64,
    pub title: String,
    pub content: String,
    pub file_path: String,
    pub highlights: BTreeMap<String, Vec<String>>,
}

impl StoreHit {
    pub fn into_result(self, highlight: &HighlightSpec) -> SearchResult {
        let mut highlights = highlight
            .fields
            .iter()
            .map(|field| (field.clone(), Vec::new()))
            .collect::<BTreeMap<_, _>>();
        highlights.extend(self.highlights);

        SearchResult {
            file_name: file_name_of(&self.file_path),
            file_url: self.file_path,
            title: self.title,
            content: self.content,
            highlights,
            score: self.score,
        }
    }
}

/// Basename of a stored path, accepting both separators.
pub fn file_name_of(file_path: &str) -> String {
    let last_segment = file_path.rsplit(['/', '\\']).next().unwrap_or(file_path);
    Path::new(last_segment)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(last_segment)
        .to_string()
}

/// One batch of documents read through a scroll cursor.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub scroll_id: Option<String>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpec {
    pub fields: Vec<String>,
    pub pre_tag: String,
    pub post_tag: String,
    pub fragment_size: u32,
    pub fragments: u32,
}

impl HighlightSpec {
    pub fn for_settings(settings: &MatchSettings) -> Self {
        Self {
            fields: settings.field_names(),
            ..Self::default()
        }
    }
}

impl Default for HighlightSpec {
    fn default() -> Self {
        Self {
            fields: vec!["title".to_string(), "content".to_string()],
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
            fragment_size: 150,
            fragments: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file_path: &str) -> StoreHit {
        StoreHit {
            id: "1".to_string(),
            score: 1.5,
            title: "Board minutes".to_string(),
            content: "minutes of the board".to_string(),
            file_path: file_path.to_string(),
            highlights: BTreeMap::from([(
                "content".to_string(),
                vec!["<em>minutes</em> of the board".to_string()],
            )]),
        }
    }

    #[test]
    fn result_carries_basename_and_raw_path() {
        let result = hit("2019/board/minutes.pdf").into_result(&HighlightSpec::default());
        assert_eq!(result.file_name, "minutes.pdf");
        assert_eq!(result.file_url, "2019/board/minutes.pdf");
        assert_eq!(result.score, 1.5);
    }

    #[test]
    fn every_highlight_field_is_present() {
        let result = hit("minutes.pdf").into_result(&HighlightSpec::default());
        assert_eq!(result.highlights.get("title"), Some(&Vec::new()));
        assert_eq!(result.highlights["content"].len(), 1);
    }

    #[test]
    fn basename_handles_windows_separators() {
        assert_eq!(file_name_of(r"scans\2020\memo.pdf"), "memo.pdf");
        assert_eq!(file_name_of("memo.pdf"), "memo.pdf");
        assert_eq!(file_name_of(""), "");
    }
}
