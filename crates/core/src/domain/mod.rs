pub mod checklist;
pub mod document;
pub mod intake;
