use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::tenant::TenantContext;

pub const ARTIFACT_EXTENSION: &str = ".md";
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Sow,
    Igce,
    MarketResearch,
    Justification,
    AcquisitionPlan,
    EvalCriteria,
    SecurityChecklist,
    #[serde(rename = "section_508")]
    Section508,
    CorCertification,
    ContractTypeJustification,
}

impl DocumentType {
    pub const ALL: [DocumentType; 10] = [
        DocumentType::Sow,
        DocumentType::Igce,
        DocumentType::MarketResearch,
        DocumentType::Justification,
        DocumentType::AcquisitionPlan,
        DocumentType::EvalCriteria,
        DocumentType::SecurityChecklist,
        DocumentType::Section508,
        DocumentType::CorCertification,
        DocumentType::ContractTypeJustification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sow => "sow",
            Self::Igce => "igce",
            Self::MarketResearch => "market_research",
            Self::Justification => "justification",
            Self::AcquisitionPlan => "acquisition_plan",
            Self::EvalCriteria => "eval_criteria",
            Self::SecurityChecklist => "security_checklist",
            Self::Section508 => "section_508",
            Self::CorCertification => "cor_certification",
            Self::ContractTypeJustification => "contract_type_justification",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sow => "Statement of Work",
            Self::Igce => "Independent Government Cost Estimate",
            Self::MarketResearch => "Market Research Report",
            Self::Justification => "Justification and Approval",
            Self::AcquisitionPlan => "Acquisition Plan",
            Self::EvalCriteria => "Evaluation Criteria",
            Self::SecurityChecklist => "Security Checklist",
            Self::Section508 => "Section 508 Compliance Statement",
            Self::CorCertification => "COR Certification",
            Self::ContractTypeJustification => "Contract Type Justification",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(
            self,
            Self::Sow
                | Self::Igce
                | Self::MarketResearch
                | Self::AcquisitionPlan
                | Self::CorCertification
        )
    }

    /// True when the final segment of `key` follows this type's artifact naming
    /// convention: `{doc_type}_<anything>.md`.
    pub fn matches_artifact(&self, key: &str) -> bool {
        let name = key.rsplit('/').next().unwrap_or(key);
        name.ends_with(ARTIFACT_EXTENSION)
            && name.strip_prefix(self.as_str()).is_some_and(|rest| rest.starts_with('_'))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|doc_type| doc_type.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownDocumentType(value.to_string()))
    }
}

/// Key for a freshly generated artifact:
/// `{tenant}/{user}/documents/{doc_type}_{YYYYMMDDTHHMMSS}.md`.
///
/// `attempt` > 1 appends `_{attempt}` so a second generation within the same
/// second gets a distinct key instead of overwriting the first.
pub fn artifact_key(
    tenant: &TenantContext,
    doc_type: DocumentType,
    created_at: DateTime<Utc>,
    attempt: u32,
) -> String {
    let stamp = created_at.format(ARTIFACT_TIMESTAMP_FORMAT);
    let discriminator = if attempt > 1 { format!("_{attempt}") } else { String::new() };
    format!(
        "{}{}_{stamp}{discriminator}{ARTIFACT_EXTENSION}",
        tenant.documents_prefix(),
        doc_type.as_str()
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub doc_type: DocumentType,
    pub title: String,
    pub content: String,
    pub artifact_key: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{artifact_key, DocumentType};
    use crate::tenant::TenantContext;

    #[test]
    fn exactly_five_types_are_required() {
        let required = DocumentType::ALL.iter().filter(|doc| doc.is_required()).count();
        assert_eq!(required, 5);
        assert!(DocumentType::Sow.is_required());
        assert!(!DocumentType::Section508.is_required());
    }

    #[test]
    fn artifact_keys_follow_the_naming_convention() {
        let tenant = TenantContext::new("tenant-a", "user-1");
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).single().expect("valid timestamp");

        assert_eq!(
            artifact_key(&tenant, DocumentType::Sow, at, 1),
            "tenant-a/user-1/documents/sow_20260304T050607.md"
        );
        assert_eq!(
            artifact_key(&tenant, DocumentType::Igce, at, 3),
            "tenant-a/user-1/documents/igce_20260304T050607_3.md"
        );
    }

    #[test]
    fn justification_does_not_match_contract_type_justification() {
        let key = "t/u/documents/contract_type_justification_20260101T000000.md";
        assert!(DocumentType::ContractTypeJustification.matches_artifact(key));
        assert!(!DocumentType::Justification.matches_artifact(key));
        assert!(!DocumentType::Sow.matches_artifact("t/u/documents/sow.txt"));
        assert!(!DocumentType::Sow.matches_artifact("t/u/documents/sowing_plan.md"));
    }

    #[test]
    fn parses_loose_document_type_names() {
        assert_eq!(
            "Market-Research".parse::<DocumentType>().ok(),
            Some(DocumentType::MarketResearch)
        );
        assert_eq!("section 508".parse::<DocumentType>().ok(), Some(DocumentType::Section508));
        assert!("purchase_order".parse::<DocumentType>().is_err());
    }
}
