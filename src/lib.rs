#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Provider, Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod voting;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;
use voting::DynStore;

/// Build the server: configuration, MongoDB, request logging and the voting API.
pub fn build() -> Rocket<Build> {
    with_api(rocket::build()).attach(DatabaseFairing)
}

/// Build the server around an existing store instead of connecting to MongoDB.
pub fn rocket_for_store<T: Provider>(provider: T, store: DynStore) -> Rocket<Build> {
    with_api(rocket::custom(provider)).manage(store)
}

fn with_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .register("/", error::catchers())
        .attach(ConfigFairing)
        .attach(LoggerFairing)
}
