pub mod types;

pub use types::{AppError, ProviderError, RepositoryError, WebError};
