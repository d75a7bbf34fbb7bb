mod api_key_service;
mod auth_service;
mod context;
mod file_service;
mod pagination;
mod user_service;

pub use api_key_service::{short_project_prefix, ApiKeyService};
pub use auth_service::{AuthService, TokenPair};
pub use context::ServiceContext;
pub use file_service::{FileService, Visibility, RETENTION_DAYS};
pub use pagination::{Filters, Metadata};
