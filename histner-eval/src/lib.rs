pub mod jsonl;
pub mod stages;

pub use jsonl::{read_jsonl, write_jsonl_atomic, JsonlError};
pub use stages::extract::{extract_documents, ExtractOutput};
pub use stages::normalize::{normalize_all, normalize_sentence};
pub use stages::predict::{Generator, ParseError, ResponseParser};
pub use stages::prompt::build_prompt;
pub use stages::report::{convert, render_report, ModelStats, ReportError, ReportSummary};
pub use stages::retrieve::{cosine_similarity, ExamplePool, Neighbor};
