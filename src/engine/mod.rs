pub mod assignment;
pub mod claim;
pub mod events;
pub mod lifecycle;
pub mod matcher;
pub mod reconciler;
pub mod state_machine;
pub mod tracking;
