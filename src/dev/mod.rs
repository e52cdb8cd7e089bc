//! The dev server (spec §4.E): wires the route tree builder, the
//! transform/cache layer, and the request router to a single HTTP
//! listener with a fixed-path WebSocket upgrade, a file watcher, and an
//! HMR broadcaster.

mod hmr;
mod server;
mod url;
mod watcher;

pub use hmr::{HmrEvent, HmrFrame};
pub use server::DevServer;
pub use url::{resolve_source_candidate, UrlFamily};
pub use watcher::{classify_event, EventKind, WatchAction, WatchedTree};
