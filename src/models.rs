pub mod activity;
pub mod caller;
pub mod chest;
pub mod item;
pub mod types;
