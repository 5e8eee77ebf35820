//! Document categorisation, request filters and source extraction.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::stream::StreamCompletion;
use crate::types::{Document, QueryRequest};

const REFERENCE_STEMS: &[&str] = &[
    "reference", "standard", "regulat", "framework", "iso", "nist", "law", "guideline",
];
const IMPLEMENTATION_STEMS: &[&str] = &[
    "implement", "polic", "procedure", "process", "control", "sop",
];
const ASSESSMENT_STEMS: &[&str] = &["assess", "audit", "evidence", "report", "gap", "finding"];

static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9_][a-z0-9_\-.]*\.(?:pdf|docx?|xlsx?|pptx?|csv|txt|md)\b")
        .expect("filename pattern compiles")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentCategory {
    Reference,
    Implementation,
    Assessment,
}

/// Session documents split by role in the audit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentBuckets {
    pub reference: Vec<Document>,
    pub implementation: Vec<Document>,
    pub assessment: Vec<Document>,
}

impl DocumentBuckets {
    pub fn len(&self) -> usize {
        self.reference.len() + self.implementation.len() + self.assessment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify by category and tags; the first matching bucket in
/// reference, implementation, assessment order wins.
pub fn categorize(document: &Document) -> Option<DocumentCategory> {
    let labels: Vec<String> = document
        .category
        .iter()
        .chain(document.document_tags.iter())
        .map(|label| label.to_ascii_lowercase())
        .collect();

    let matches = |stems: &[&str]| {
        labels.iter().any(|label| {
            label
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| stems.iter().any(|stem| token.starts_with(stem)))
        })
    };

    if matches(REFERENCE_STEMS) {
        Some(DocumentCategory::Reference)
    } else if matches(IMPLEMENTATION_STEMS) {
        Some(DocumentCategory::Implementation)
    } else if matches(ASSESSMENT_STEMS) {
        Some(DocumentCategory::Assessment)
    } else {
        None
    }
}

pub fn categorize_documents(documents: &[Document]) -> DocumentBuckets {
    let mut buckets = DocumentBuckets::default();
    for document in documents {
        match categorize(document) {
            Some(DocumentCategory::Reference) => buckets.reference.push(document.clone()),
            Some(DocumentCategory::Implementation) => {
                buckets.implementation.push(document.clone())
            }
            Some(DocumentCategory::Assessment) => buckets.assessment.push(document.clone()),
            None => {}
        }
    }
    buckets
}

/// Distinct document versions and tags across the loaded documents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilters {
    pub document_versions: Vec<String>,
    pub document_tags: Vec<String>,
}

impl RequestFilters {
    pub fn derive(documents: &[Document]) -> Self {
        let mut versions = Distinct::default();
        let mut tags = Distinct::default();
        for document in documents {
            if let Some(version) = &document.document_version {
                versions.insert(version);
            }
            for tag in &document.document_tags {
                tags.insert(tag);
            }
        }
        Self {
            document_versions: versions.items,
            document_tags: tags.items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.document_versions.is_empty() && self.document_tags.is_empty()
    }

    /// Attach to a request; empty lists are omitted rather than sent empty.
    pub fn apply(self, mut request: QueryRequest) -> QueryRequest {
        request.document_versions = Some(self.document_versions).filter(|v| !v.is_empty());
        request.document_tags = Some(self.document_tags).filter(|v| !v.is_empty());
        request
    }
}

#[derive(Default)]
struct Distinct {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl Distinct {
    fn insert(&mut self, value: &str) {
        let value = value.trim();
        if !value.is_empty() && self.seen.insert(value.to_string()) {
            self.items.push(value.to_string());
        }
    }
}

/// Document filenames cited in a completed answer, first mention first.
pub fn extract_filenames(completion: &StreamCompletion) -> Vec<String> {
    let mut filenames = Distinct::default();
    for found in FILENAME_PATTERN.find_iter(&completion.full_text) {
        filenames.insert(found.as_str());
    }
    filenames.items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, version: Option<&str>, tags: &[&str]) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{id}.pdf"),
            document_version: version.map(str::to_string),
            document_tags: tags.iter().map(|tag| tag.to_string()).collect(),
            category: None,
        }
    }

    #[test]
    fn categorizes_by_tag_stems() {
        assert_eq!(
            categorize(&document("a", None, &["ISO27001"])),
            Some(DocumentCategory::Reference)
        );
        assert_eq!(
            categorize(&document("b", None, &["access-policies"])),
            Some(DocumentCategory::Implementation)
        );
        assert_eq!(
            categorize(&document("c", None, &["gap_assessment"])),
            Some(DocumentCategory::Assessment)
        );
        assert_eq!(categorize(&document("d", None, &["supervisor"])), None);
    }

    #[test]
    fn category_field_participates_in_classification() {
        let mut doc = document("e", None, &[]);
        doc.category = Some("Audit Evidence".to_string());
        assert_eq!(categorize(&doc), Some(DocumentCategory::Assessment));
    }

    #[test]
    fn reference_wins_over_later_buckets() {
        assert_eq!(
            categorize(&document("f", None, &["policy", "standard"])),
            Some(DocumentCategory::Reference)
        );
    }

    #[test]
    fn buckets_skip_uncategorized_documents() {
        let docs = vec![
            document("a", None, &["iso"]),
            document("b", None, &["procedure"]),
            document("c", None, &["misc"]),
        ];
        let buckets = categorize_documents(&docs);
        assert_eq!(buckets.reference.len(), 1);
        assert_eq!(buckets.implementation.len(), 1);
        assert!(buckets.assessment.is_empty());
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn derive_collects_distinct_versions_and_tags() {
        let docs = vec![
            document("a", Some("v1"), &["iso", "policy"]),
            document("b", Some("v1"), &["policy"]),
            document("c", Some("v2"), &[]),
            document("d", None, &[" "]),
        ];
        let filters = RequestFilters::derive(&docs);
        assert_eq!(filters.document_versions, vec!["v1", "v2"]);
        assert_eq!(filters.document_tags, vec!["iso", "policy"]);
    }

    #[test]
    fn empty_filters_are_omitted_from_request() {
        let request = RequestFilters::derive(&[]).apply(QueryRequest::new("q", 0.7, 10));
        assert!(request.document_versions.is_none());
        assert!(request.document_tags.is_none());

        let request = RequestFilters::derive(&[document("a", Some("v3"), &[])])
            .apply(QueryRequest::new("q", 0.7, 10));
        assert_eq!(request.document_versions, Some(vec!["v3".to_string()]));
        assert!(request.document_tags.is_none());
    }

    #[test]
    fn extracts_distinct_filenames_in_order() {
        let completion = StreamCompletion {
            full_text: "See access_policy.pdf and docs/Risk-Register.xlsx. \
                        Also access_policy.pdf again."
                .to_string(),
            ..Default::default()
        };
        assert_eq!(
            extract_filenames(&completion),
            vec!["access_policy.pdf", "Risk-Register.xlsx"]
        );
    }

    #[test]
    fn plain_answers_have_no_sources() {
        let completion = StreamCompletion {
            full_text: "The scope clause defines...".to_string(),
            ..Default::default()
        };
        assert!(extract_filenames(&completion).is_empty());
    }
}
