//! HTTP surface for a single taleforge session host: load a scenario,
//! run turns against it, and export state back out. Everything
//! session/turn-shaped is delegated to `tf-engine` and `tf-world`; this
//! crate only owns routing, auth, and the session/world registry that
//! bridges HTTP requests to `tf-engine`'s single-world `TurnDeps`.

pub mod api;
pub mod config;
pub mod registry;
pub mod state;
