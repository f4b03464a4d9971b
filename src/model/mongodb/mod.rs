mod bson;
mod collection;
mod errors;
mod store;

pub use bson::{id_string, serde_string_map, Id};
pub use collection::{
    ensure_indexes_exist, Coll, MongoCollection, BALLOT_SESSION_INDEX, BALLOT_VOTER_INDEX,
    SESSION_SLOT_INDEX,
};
pub use store::MongoStore;
