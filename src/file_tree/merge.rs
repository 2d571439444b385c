//! Pure merge operations on the file tree.
//!
//! The tree is a sequence of top-level [`FileNode`]s under a virtual root
//! whose path is the empty string. Nodes are matched by canonical path, never
//! by identity: every pushed snapshot carries fresh node instances.

use crate::model::FileNode;
use crate::primitives::path_utils;

/// Default number of entries the server returns per directory before it
/// truncates the listing.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Replace the children of the node at `target` with `new_children`.
///
/// The target becomes `loaded` and `has_more` reports whether the listing
/// reached `page_limit`. An empty listing yields a loaded, empty folder. If no
/// node has the target path the tree is returned unchanged. Branches off the
/// path to the target are moved over untouched.
pub fn replace_subtree(
    tree: Vec<FileNode>,
    target: &str,
    new_children: Vec<FileNode>,
    page_limit: usize,
) -> Vec<FileNode> {
    let target = path_utils::normalize(target);
    if target.is_empty() {
        return new_children;
    }
    let mut tree = tree;
    if let Some(node) = find_node_mut(&mut tree, &target) {
        node.has_more = new_children.len() >= page_limit;
        node.children = Some(new_children);
        node.loaded = true;
    } else {
        tracing::debug!("replace_subtree: {} not in tree, skipping", target);
    }
    tree
}

/// Replace the whole tree with an authoritative snapshot.
pub fn replace_all(_tree: Vec<FileNode>, new_tree: Vec<FileNode>) -> Vec<FileNode> {
    new_tree
}

/// Find the node at `path`. The root itself is not a node.
pub fn find_node<'a>(tree: &'a [FileNode], path: &str) -> Option<&'a FileNode> {
    let path = path_utils::normalize(path);
    if path.is_empty() {
        return None;
    }
    let mut level = tree;
    loop {
        let node = level
            .iter()
            .find(|n| path_utils::is_within(&path, &n.path))?;
        if node.path == path {
            return Some(node);
        }
        level = node.children.as_deref()?;
    }
}

fn find_node_mut<'a>(tree: &'a mut [FileNode], path: &str) -> Option<&'a mut FileNode> {
    let node = tree
        .iter_mut()
        .find(|n| path_utils::is_within(path, &n.path))?;
    if node.path == path {
        return Some(node);
    }
    find_node_mut(node.children.as_deref_mut()?, path)
}
