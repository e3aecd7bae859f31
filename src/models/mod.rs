mod article;
mod source;
mod summary;
mod user;

pub use article::{Article, NewArticle, PopularTag, Sentiment, Tag};
pub use source::{NewUserSource, SourceKind, UserSource};
pub use summary::{NewScheduledSummary, ScheduledSummary};
pub use user::{NewUser, SavedArticle, User};
