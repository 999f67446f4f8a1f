pub mod claim;
pub mod dispatcher;
pub mod resolver;
pub mod store;
pub mod sweeper;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatcher::{DispatchEngine, DispatchFault, DispatchOutcome};
pub use resolver::RecipientResolver;
pub use store::{CommitOutcome, DocumentStore, PgDocumentStore};
pub use sweeper::RetentionSweeper;
