//! Notebook file formats.

mod md;
mod parser;
mod writer;

pub use md::{markdown_content, write_markdown};
pub use parser::{CellRecord, parse_notebook, parse_notebook_content, record_to_definition};
pub use writer::{definition_to_record, write_notebook, write_notebook_content};
