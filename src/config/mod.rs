//! Command-line surface and its resolution into runtime configuration.
//!
//! Two tiers, mirroring the teacher's layered configuration but collapsed
//! to what this specification actually needs: a project has no config
//! file of its own, only CLI flags, environment variables and `.env`.

mod cli;
mod rt;

pub use cli::{BuildArgs, DevArgs, StartArgs};
pub use rt::{load_alias_map, load_dotenv, RtcBuild, RtcDev, RtcStart};
