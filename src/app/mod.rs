//! User-facing actions built on top of the tree and terminal layers.

pub mod file_mutations;

pub use file_mutations::{MutationCoordinator, MutationError, RefreshHook};
