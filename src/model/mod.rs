//! Core data model: the remote file tree and the open editor tabs.

pub mod file_node;
pub mod tabs;

pub use file_node::{FileNode, NodeKind};
pub use tabs::{Tab, TabStore};
