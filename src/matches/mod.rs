pub mod models;
pub mod repository;
pub mod store;

pub use repository::PgMatchStore;
pub use store::MatchStore;
