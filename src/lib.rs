#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod scheduled_task;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;
use model::db::poll::PollCloserFairing;

/// Construct the rocket instance with all routes, fairings, and managed state.
///
/// Fairing order matters: the database must be online before the poll
/// closers can be scheduled.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(PollCloserFairing)
}
