pub mod block;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod file;
pub mod lineage;
pub mod location;
pub mod run;
pub mod store;
pub mod types;

pub use block::BlockManager;
pub use catalog::{QueryCatalog, QueryDialect, QueryOp, SqliteDialect};
pub use config::{JournalMode, LfndbConfig, Synchronous};
pub use discovery::DiscoveryQueries;
pub use error::{LfndbError, LfndbErrorCode, ResourceType};
pub use file::FileRecord;
pub use lineage::LineageManager;
pub use location::{LocationManager, PendingLocations};
pub use run::Run;
pub use store::{bootstrap_schema, open, open_in_memory, SCHEMA_VERSION};
pub use types::{Algorithm, Block, BlockStatus, FileIdent, UploadStatus};
