pub mod adapters;
pub mod reconciler;
pub mod types;
