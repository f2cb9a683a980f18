mod ask;
mod config;
mod index;
mod ingest;

pub use ask::AskArgs;
pub use config::ConfigCommand;
pub use index::IndexCommand;
pub use ingest::IngestArgs;

pub use ask::handle_ask;
pub use config::handle_config;
pub use index::handle_index;
pub use ingest::handle_ingest;
