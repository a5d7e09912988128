mod bson;
mod collection;

pub use bson::{serde_opt_datetime, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
