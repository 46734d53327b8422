pub mod jsonl;
pub mod report;
