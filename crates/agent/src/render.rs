//! Markdown rendering for generated acquisition documents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use procura_core::DocumentType;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

/// Input fields with a dedicated place in the templates. Everything else in the
/// data object is listed under "Additional Details".
const KNOWN_FIELDS: [&str; 4] =
    ["description", "estimated_cost", "period_of_performance", "requester"];

const DETAILS_TEMPLATE: (&str, &str) =
    ("_details.md", include_str!("../../../templates/documents/_details.md"));

const DOCUMENT_TEMPLATES: [(DocumentType, &str); 10] = [
    (DocumentType::Sow, include_str!("../../../templates/documents/sow.md")),
    (DocumentType::Igce, include_str!("../../../templates/documents/igce.md")),
    (
        DocumentType::MarketResearch,
        include_str!("../../../templates/documents/market_research.md"),
    ),
    (DocumentType::Justification, include_str!("../../../templates/documents/justification.md")),
    (
        DocumentType::AcquisitionPlan,
        include_str!("../../../templates/documents/acquisition_plan.md"),
    ),
    (DocumentType::EvalCriteria, include_str!("../../../templates/documents/eval_criteria.md")),
    (
        DocumentType::SecurityChecklist,
        include_str!("../../../templates/documents/security_checklist.md"),
    ),
    (DocumentType::Section508, include_str!("../../../templates/documents/section_508.md")),
    (
        DocumentType::CorCertification,
        include_str!("../../../templates/documents/cor_certification.md"),
    ),
    (
        DocumentType::ContractTypeJustification,
        include_str!("../../../templates/documents/contract_type_justification.md"),
    ),
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
    #[error("document data must be a JSON object")]
    InvalidData,
}

impl From<tera::Error> for RenderError {
    fn from(error: tera::Error) -> Self {
        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Template(message)
    }
}

#[derive(Serialize)]
struct Detail {
    label: String,
    value: String,
}

/// Renders `(doc_type, title, data)` to markdown. Pure apart from the
/// generation timestamp printed in the header.
pub struct DocumentRenderer {
    tera: Tera,
}

impl DocumentRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);

        let mut templates = vec![DETAILS_TEMPLATE];
        templates.extend(
            DOCUMENT_TEMPLATES.iter().map(|(doc_type, body)| (template_name(*doc_type), *body)),
        );
        tera.add_raw_templates(templates)?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        doc_type: DocumentType,
        title: &str,
        data: &Value,
        generated_at: DateTime<Utc>,
    ) -> Result<String, RenderError> {
        let fields = match data {
            Value::Object(fields) => fields.clone(),
            Value::Null => serde_json::Map::new(),
            _ => return Err(RenderError::InvalidData),
        };

        let mut context = Context::new();
        context.insert("title", title);
        context.insert("doc_type", doc_type.as_str());
        context.insert("doc_type_name", doc_type.display_name());
        context.insert("generated_at", &generated_at.format("%Y-%m-%d %H:%M UTC").to_string());
        context.insert("description", &text_field(fields.get("description")));
        context.insert("period_of_performance", &text_field(fields.get("period_of_performance")));
        context.insert("requester", &text_field(fields.get("requester")));
        context.insert("estimated_cost", fields.get("estimated_cost").unwrap_or(&Value::Null));

        let details: Vec<Detail> = fields
            .iter()
            .filter(|(key, value)| !KNOWN_FIELDS.contains(&key.as_str()) && !value.is_null())
            .map(|(key, value)| Detail { label: humanize(key), value: text_field(Some(value)) })
            .collect();
        context.insert("details", &details);

        Ok(self.tera.render(template_name(doc_type), &context)?)
    }
}

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", money_filter);
}

/// `amount | money` renders `$1,234.50`. Accepts numbers and numeric strings.
fn money_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let amount = match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(text) => parse_decimal(&text.trim().trim_start_matches('$').replace(',', "")),
        _ => None,
    }
    .ok_or_else(|| tera::Error::msg(format!("money filter expects a number, got `{value}`")))?;

    Ok(Value::String(format_money(amount)))
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>().ok().or_else(|| Decimal::from_scientific(raw).ok())
}

pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let formatted = format!("{:.2}", rounded.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

fn template_name(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Sow => "sow.md",
        DocumentType::Igce => "igce.md",
        DocumentType::MarketResearch => "market_research.md",
        DocumentType::Justification => "justification.md",
        DocumentType::AcquisitionPlan => "acquisition_plan.md",
        DocumentType::EvalCriteria => "eval_criteria.md",
        DocumentType::SecurityChecklist => "security_checklist.md",
        DocumentType::Section508 => "section_508.md",
        DocumentType::CorCertification => "cor_certification.md",
        DocumentType::ContractTypeJustification => "contract_type_justification.md",
    }
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Array(items)) => {
            items.iter().map(|item| text_field(Some(item))).collect::<Vec<_>>().join(", ")
        }
        Some(other) => other.to_string(),
    }
}

fn humanize(key: &str) -> String {
    let mut label = String::with_capacity(key.len());
    for (index, word) in key.split(['_', '-']).filter(|word| !word.is_empty()).enumerate() {
        if index > 0 {
            label.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            label.extend(first.to_uppercase());
            label.push_str(chars.as_str());
        }
    }
    label
}
