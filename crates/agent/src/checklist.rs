use std::sync::Arc;

use procura_core::{DocumentChecklist, TenantContext};
use procura_db::{ObjectStore, StoreError};

const ARTIFACT_PAGE_SIZE: usize = 500;

/// Read-only projection of the document checklist from stored artifacts.
#[derive(Clone)]
pub struct ChecklistTracker {
    objects: Arc<dyn ObjectStore>,
}

impl ChecklistTracker {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    pub async fn checklist(&self, tenant: &TenantContext) -> Result<DocumentChecklist, StoreError> {
        let prefix = tenant.documents_prefix();
        let mut keys = Vec::new();
        loop {
            let page = self
                .objects
                .list_after(&prefix, keys.last().map(String::as_str), ARTIFACT_PAGE_SIZE)
                .await?;
            let exhausted = page.len() < ARTIFACT_PAGE_SIZE;
            keys.extend(page.into_iter().map(|artifact| artifact.key));
            if exhausted {
                break;
            }
        }
        Ok(DocumentChecklist::from_artifacts(keys))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use procura_core::{ChecklistStatus, DocumentType, TenantContext};
    use procura_db::{
        AttributeValue, InMemoryKeyValueStore, InMemoryObjectStore, Item, KeyValueStore,
        ObjectStore, PutMode,
    };

    use super::ChecklistTracker;

    async fn put_markdown(objects: &InMemoryObjectStore, key: &str) {
        objects
            .put(key, "# draft".to_string(), "text/markdown", PutMode::CreateOnly)
            .await
            .expect("put artifact");
    }

    #[tokio::test]
    async fn only_stored_artifacts_mark_items_complete() {
        let objects = Arc::new(InMemoryObjectStore::default());
        let records = InMemoryKeyValueStore::default();
        let tracker = ChecklistTracker::new(objects.clone());
        let tenant = TenantContext::new("demo-tenant", "ws-1");

        let mut intake = Item::new();
        intake.insert("PK".to_string(), AttributeValue::string("INTAKE#demo-tenant"));
        intake.insert("SK".to_string(), AttributeValue::string("INTAKE#1"));
        intake.insert("sow".to_string(), AttributeValue::string("drafted"));
        records.put_item(intake).await.expect("put intake");

        let empty = tracker.checklist(&tenant).await.expect("checklist");
        assert_eq!(empty.summary.total, 10);
        assert_eq!(empty.summary.complete, 0);

        put_markdown(&objects, "demo-tenant/ws-1/documents/sow_20260101T120000.md").await;
        put_markdown(&objects, "demo-tenant/ws-2/documents/igce_20260101T120000.md").await;

        let checklist = tracker.checklist(&tenant).await.expect("checklist");
        assert_eq!(checklist.summary.complete, 1);
        assert_eq!(checklist.summary.pending, 9);
        let sow = checklist.item(DocumentType::Sow).expect("sow item");
        assert_eq!(sow.status, ChecklistStatus::Complete);
        assert_eq!(
            checklist.item(DocumentType::Igce).map(|item| item.status),
            Some(ChecklistStatus::Pending)
        );
    }

    #[tokio::test]
    async fn artifacts_sorting_after_a_large_backlog_still_count() {
        let objects = Arc::new(InMemoryObjectStore::default());
        let tracker = ChecklistTracker::new(objects.clone());
        let tenant = TenantContext::new("demo-tenant", "ws-1");

        for n in 0..1_000 {
            let key = format!(
                "demo-tenant/ws-1/documents/acquisition_plan_20260101T000000_{n:04}.md"
            );
            put_markdown(&objects, &key).await;
        }
        put_markdown(&objects, "demo-tenant/ws-1/documents/sow_20260101T000000.md").await;

        let checklist = tracker.checklist(&tenant).await.expect("checklist");
        let sow = checklist.item(DocumentType::Sow).expect("sow item");
        assert_eq!(sow.status, ChecklistStatus::Complete);
        assert_eq!(
            sow.artifact_key.as_deref(),
            Some("demo-tenant/ws-1/documents/sow_20260101T000000.md")
        );
        let plan = checklist.item(DocumentType::AcquisitionPlan).expect("plan item");
        assert_eq!(
            plan.artifact_key.as_deref(),
            Some("demo-tenant/ws-1/documents/acquisition_plan_20260101T000000_0999.md")
        );
        assert_eq!(checklist.summary.complete, 2);
    }
}
