//! The file-system router: builds a radix-style route tree out of a
//! directory, matches requests against it, and derives the component
//! import descriptors code generators need.

mod component;
mod config;
mod matcher;
pub mod middleware;
mod tree;

pub use component::{ComponentDescriptor, ComponentRegistry};
pub use config::{api_config, page_config, RouteFileConfig, RoutePattern};
pub use matcher::{collect_patterns, match_route, RouteMatch};
pub use middleware::{ChainDirective, MiddlewareChain};
pub use tree::{build_route_tree, FileRef, ParamChild, RouteNode, WildcardChild};
