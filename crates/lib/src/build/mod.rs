//! The build data model: DAG nodes, exports and the sandbox wrapper.

mod hash;
mod types;

pub use types::{Build, BuildId, BuildSandbox, EnvVar, ExportScope, ExportSpec};
