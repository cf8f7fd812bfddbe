pub mod elasticsearch;

pub use elasticsearch::{document_from_source, ElasticsearchStore};
