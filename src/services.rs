pub mod activity;
pub mod auth;
pub mod catalog;
pub mod chest;

pub use activity::ActivityService;
pub use auth::AuthService;
pub use catalog::CatalogService;
pub use chest::ChestService;
