//! Document checklist projection.
//!
//! Completion is derived from the artifact keys that actually exist, never
//! from intake data or conversation state.

use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    Pending,
    Complete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChecklistItem {
    pub doc_type: DocumentType,
    pub required: bool,
    pub status: ChecklistStatus,
    pub artifact_key: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistSummary {
    pub complete: usize,
    pub pending: usize,
    pub total: usize,
    pub required_complete: usize,
    pub required_total: usize,
}

impl ChecklistSummary {
    pub fn all_required_complete(&self) -> bool {
        self.required_complete == self.required_total
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChecklist {
    pub items: Vec<DocumentChecklistItem>,
    pub summary: ChecklistSummary,
}

impl DocumentChecklist {
    /// Projects the ten known document types over the given artifact keys.
    ///
    /// When several artifacts match a type, the lexicographically greatest key
    /// wins; with timestamped names that is the most recent generation.
    pub fn from_artifacts<I, S>(artifact_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys =
            artifact_keys.into_iter().map(|key| key.as_ref().to_string()).collect::<Vec<_>>();

        let items = DocumentType::ALL
            .into_iter()
            .map(|doc_type| {
                let artifact_key =
                    keys.iter().filter(|key| doc_type.matches_artifact(key)).max().cloned();
                let status = if artifact_key.is_some() {
                    ChecklistStatus::Complete
                } else {
                    ChecklistStatus::Pending
                };
                DocumentChecklistItem {
                    doc_type,
                    required: doc_type.is_required(),
                    status,
                    artifact_key,
                }
            })
            .collect::<Vec<_>>();

        let summary = summarize(&items);
        Self { items, summary }
    }

    pub fn item(&self, doc_type: DocumentType) -> Option<&DocumentChecklistItem> {
        self.items.iter().find(|item| item.doc_type == doc_type)
    }
}

fn summarize(items: &[DocumentChecklistItem]) -> ChecklistSummary {
    let complete = items.iter().filter(|item| item.status == ChecklistStatus::Complete).count();
    let required_total = items.iter().filter(|item| item.required).count();
    let required_complete = items
        .iter()
        .filter(|item| item.required && item.status == ChecklistStatus::Complete)
        .count();

    ChecklistSummary {
        complete,
        pending: items.len() - complete,
        total: items.len(),
        required_complete,
        required_total,
    }
}

#[cfg(test)]
mod tests {
    use super::{ChecklistStatus, DocumentChecklist};
    use crate::domain::document::DocumentType;

    #[test]
    fn no_artifacts_means_everything_pending() {
        let checklist = DocumentChecklist::from_artifacts(Vec::<String>::new());

        assert_eq!(checklist.items.len(), 10);
        assert!(checklist.items.iter().all(|item| item.status == ChecklistStatus::Pending));
        assert_eq!(checklist.summary.total, 10);
        assert_eq!(checklist.summary.complete, 0);
        assert_eq!(checklist.summary.pending, 10);
        assert_eq!(checklist.summary.required_total, 5);
        assert!(!checklist.summary.all_required_complete());
    }

    #[test]
    fn only_the_matching_type_completes() {
        let checklist =
            DocumentChecklist::from_artifacts(["t/u/documents/sow_20260101T120000.md"]);

        let sow = checklist.item(DocumentType::Sow).expect("sow item");
        assert_eq!(sow.status, ChecklistStatus::Complete);
        assert_eq!(sow.artifact_key.as_deref(), Some("t/u/documents/sow_20260101T120000.md"));
        assert_eq!(checklist.summary.complete, 1);
        assert_eq!(checklist.summary.required_complete, 1);
        assert!(checklist
            .items
            .iter()
            .filter(|item| item.doc_type != DocumentType::Sow)
            .all(|item| item.status == ChecklistStatus::Pending));
    }

    #[test]
    fn latest_generation_is_reported() {
        let checklist = DocumentChecklist::from_artifacts([
            "t/u/documents/igce_20260101T120000.md",
            "t/u/documents/igce_20260301T090000.md",
            "t/u/documents/notes.txt",
        ]);

        let igce = checklist.item(DocumentType::Igce).expect("igce item");
        assert_eq!(igce.artifact_key.as_deref(), Some("t/u/documents/igce_20260301T090000.md"));
        assert_eq!(checklist.summary.complete, 1);
    }

    #[test]
    fn all_required_complete_when_five_required_exist() {
        let keys = ["sow", "igce", "market_research", "acquisition_plan", "cor_certification"]
            .map(|doc| format!("t/u/documents/{doc}_20260101T000000.md"));
        let checklist = DocumentChecklist::from_artifacts(keys);

        assert!(checklist.summary.all_required_complete());
        assert_eq!(checklist.summary.complete, 5);
        assert_eq!(checklist.summary.pending, 5);
    }
}
