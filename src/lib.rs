#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::ElectionFairing;
use crate::election::Election;
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod election;
pub mod error;
pub mod logging;
pub mod model;

/// Build the server, with the election store chosen by configuration.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ElectionFairing)
}

/// Build the server around an existing election.
pub fn rocket_for_election(election: Election) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(election)
}
