pub mod database;
pub mod error;
pub mod schema;
pub mod turns;

pub use database::Database;
pub use error::StoreError;
pub use turns::TurnRepo;
