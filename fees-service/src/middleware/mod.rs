pub mod actor;

pub use actor::{ActorContext, ActorRole};
