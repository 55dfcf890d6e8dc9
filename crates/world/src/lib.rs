//! The world model: scenario-derived state (locations, characters,
//! knowledge, events, time) plus the single mutation surface session code
//! goes through to change it.

pub mod error;
pub mod model;
pub mod scenario;
pub mod store;

pub use error::{Result, WorldError};
pub use model::{Character, CharacterId, ClusterId, Event, KnowledgeEntry, KnowledgeSource, LocationCluster, World};
pub use scenario::{Scenario, ScenarioCharacter, ScenarioLocation};
pub use store::WorldStore;
