//! The Workflow Spec Compiler and its immediate collaborators: turning a
//! node/link UI graph plus a declarative Spec into an executable
//! prompt-graph. No database or HTTP concerns live here; `forge-core`
//! composes this crate with the repository, worker client, and scheduler.

pub mod error;
pub mod graph;
pub mod mask;
pub mod passthrough;
pub mod reconcile;
pub mod sanitize;
pub mod schema;
pub mod spec;
pub mod staging;

pub use error::{CompileError, StagingError};
pub use graph::Graph;
pub use reconcile::{compile, CompileInput, CompileOutput, MaskMerger, NoMaskMerger};
pub use schema::SchemaCatalog;
pub use spec::Spec;
