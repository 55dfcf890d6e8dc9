//! Turn orchestration: prompt building, context trimming, location
//! resolution, off-screen simulation, and the tool-calling loop that ties
//! them together into a single player turn. Everything here is pure
//! orchestration over `tf-world`'s mutation surface and `tf-providers`'
//! provider trait — no HTTP, no persistence format decisions.

pub mod cancel;
pub mod location_resolver;
pub mod prompt_builder;
pub mod session_lock;
pub mod simulator;
pub mod tools;
pub mod trimmer;
pub mod turn;

pub use cancel::{CancelMap, CancelToken};
pub use location_resolver::{fallback_canonicalize, resolve_location, LocationResolution};
pub use prompt_builder::{build_system_prompt, build_tool_definitions};
pub use session_lock::{SessionBusy, SessionLockMap};
pub use simulator::{dialogue_turn_count, run_simulation, select_depth, SimDepth};
pub use tools::{dispatch_tool, MOVE_COST_TICKS};
pub use trimmer::{approx_token_cost, trim, MAX_CONTEXT_TOKENS};
pub use turn::{spawn_turn, TurnDeps, TurnEvent, TurnInput, TurnKind, MAX_TOOL_STEPS};
