use crate::primitives::path_utils;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a tree entry, serialized as the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Folder => "folder",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the remote workspace tree.
///
/// `children` is only meaningful when `loaded` is true. A folder with
/// `loaded == false` is an unexpanded placeholder, while `loaded == true`
/// with no children is a folder known to be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
    #[serde(default)]
    pub loaded: bool,
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
}

impl FileNode {
    pub fn file(path: &str) -> Self {
        let path = path_utils::normalize(path);
        Self {
            name: path_utils::file_name(&path),
            path,
            kind: NodeKind::File,
            children: None,
            loaded: false,
            has_more: false,
        }
    }

    /// An unexpanded folder placeholder.
    pub fn folder(path: &str) -> Self {
        Self {
            kind: NodeKind::Folder,
            ..Self::file(path)
        }
    }

    /// A folder whose children are already materialized.
    pub fn loaded_folder(path: &str, children: Vec<FileNode>) -> Self {
        Self {
            children: Some(children),
            loaded: true,
            ..Self::folder(path)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Children, or an empty slice for files and unloaded folders.
    pub fn children(&self) -> &[FileNode] {
        match (&self.children, self.loaded) {
            (Some(children), true) => children,
            _ => &[],
        }
    }

    /// Canonicalize this node's path (and its descendants') and restore the
    /// `children` / `loaded` invariant.
    ///
    /// Nodes decoded from the server may carry leading slashes, or a
    /// populated `children` array without `loaded` set; snapshot payloads
    /// include children for every watched folder.
    pub fn canonicalize(&mut self) {
        self.path = path_utils::normalize(&self.path);
        if self.name.is_empty() {
            self.name = path_utils::file_name(&self.path);
        }
        match self.kind {
            NodeKind::File => {
                self.children = None;
                self.loaded = false;
                self.has_more = false;
            }
            NodeKind::Folder => match &mut self.children {
                Some(children) => {
                    self.loaded = true;
                    canonicalize_all(children);
                }
                None => self.loaded = false,
            },
        }
    }
}

/// Canonicalize a whole sequence of nodes decoded from the wire.
pub fn canonicalize_all(nodes: &mut [FileNode]) {
    for node in nodes {
        node.canonicalize();
    }
}

/// Decode a listing or snapshot payload. `null` decodes as an empty sequence.
pub fn decode_nodes(json: &str) -> serde_json::Result<Vec<FileNode>> {
    let nodes: Option<Vec<FileNode>> = serde_json::from_str(json)?;
    let mut nodes = nodes.unwrap_or_default();
    canonicalize_all(&mut nodes);
    Ok(nodes)
}
