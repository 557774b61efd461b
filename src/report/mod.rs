//! Report rendering.
//!
//! Turns the in-memory cycle and quarter reports into Markdown or JSON.

pub mod generator;

pub use generator::{
    generate_json_report, generate_markdown_report, generate_quarter_markdown_report,
};
