//! Streaming session client for the compliance-audit chat API.
//!
//! The crate is organized in three cooperating layers: the stream transport
//! (`stream`), the per-conversation reducer (`conversation`), and the session
//! orchestrator (`orchestrator`) that ties a conversation identity to a
//! sequence of question/answer exchanges.

pub mod abort;
pub mod auth;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod filters;
pub mod orchestrator;
pub mod stream;
pub mod types;
pub mod utils;

#[allow(unused_imports)]
pub use abort::*;
#[allow(unused_imports)]
pub use auth::*;
#[allow(unused_imports)]
pub use backend::*;
#[allow(unused_imports)]
pub use config::*;
#[allow(unused_imports)]
pub use conversation::*;
#[allow(unused_imports)]
pub use errors::*;
#[allow(unused_imports)]
pub use filters::*;
#[allow(unused_imports)]
pub use orchestrator::*;
#[allow(unused_imports)]
pub use stream::*;
#[allow(unused_imports)]
pub use types::*;
