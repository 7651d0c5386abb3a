//! Report generation and export.

mod export;
mod generator;

pub use export::generate_csv;
pub use generator::{generate_json_report, generate_markdown_report, Report};
