//! DOCX export of drafted responses

pub mod generator;
pub mod markdown;

pub use generator::{png_dimensions, DocumentRequest, DocxGenerator};
pub use markdown::{parse_markdown, Block, Span};
