// Live file tree for a remote workspace root
//
// The tree is kept in sync with the server by a push subscription
// (`sync`), extended on demand by lazy folder fetches (`loader`), and only
// ever modified through the pure operations in `merge`.

pub mod driver;
pub mod explorer;
pub mod loader;
pub mod merge;
pub mod sync;

pub use driver::TreeWatchDriver;
pub use explorer::FileExplorer;
pub use loader::{ExpandStart, FetchOutcome, FetchTicket, LazyLoader, LoadError};
pub use merge::{find_node, replace_all, replace_subtree, DEFAULT_PAGE_LIMIT};
pub use sync::{AttemptId, ConnectionState, SyncCommand, SyncEvent, TreeSyncSession};
