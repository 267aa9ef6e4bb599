//! Control-plane command engine (C9): UPDATE/LOOKUP handling, their
//! shared modifier-letter grammar, and reply formatting.

pub mod engine;
pub mod options;
pub mod reply;

pub use engine::{CommandEngine, CommandOp, UlCommand};
pub use options::{InterfaceSlot, UlOpts, parse_ul_opts};
pub use reply::UlReply;
