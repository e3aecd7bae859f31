mod analyzer;
mod content_fetcher;
mod ingest;
mod saved;
mod sources;
mod tags;

pub use analyzer::{AnalyzeRequest, ArticleAnalyzer};
pub use content_fetcher::{collapse_whitespace, ContentExtractor, ExtractedContent, Extractor};
pub use ingest::{IngestReport, NewsIngestor};
pub use saved::SavedArticles;
pub use sources::SourceRegistry;
pub use tags::TagResolver;
