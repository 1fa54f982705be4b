// Pure text helpers shared by the ingest and CV stages. No I/O here.

pub mod normalize;
pub mod sections;

pub use normalize::{collapse_whitespace, normalize_extracted};
pub use sections::split_sections;
