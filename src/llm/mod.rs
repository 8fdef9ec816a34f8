pub mod provider;
pub mod schema;
pub mod types;

pub use provider::{ModelProvider, TurnRequest};
pub use schema::{adapt_schema, canonical_action_schema, output_format, ProviderDialect};
pub use types::{Message, Role, ToolSpec};
