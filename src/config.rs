use std::sync::Arc;

use log::{error, info, warn};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::election::Election;
use crate::error::Result;
use crate::model::mongodb::{
    ensure_candidate_id_counter_exists, ensure_indexes_exist, Coll, MongoRegistry, MongoSecrets,
};

/// Election configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables.
#[derive(Debug, Default, Deserialize)]
pub struct ElectionConfig {
    // secrets
    db_uri: Option<String>,
    // non-secrets
    db_name: Option<String>,
}

impl ElectionConfig {
    /// Name of the MongoDB database holding the registry.
    /// Configured via `DB_NAME`, defaulting to `ballots`.
    pub fn db_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or("ballots")
    }
}

/// A fairing that loads the election config, connects to the configured
/// store, performs any setup necessary, and places the [`Election`] into
/// managed state.
///
/// Without a `db_uri` the election runs against an in-memory registry, and
/// everything is lost on shutdown.
pub struct ElectionFairing;

#[rocket::async_trait]
impl Fairing for ElectionFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<ElectionConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load election config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let Some(ref db_uri) = config.db_uri else {
            warn!("No `db_uri` configured, the registry will only be held in memory");
            return Ok(rocket.manage(Election::in_memory()));
        };

        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(config.db_name());
        let election = match election_for_database(&db).await {
            Ok(election) => election,
            Err(e) => {
                error!("Failed to prepare database: {e}");
                return Err(rocket);
            }
        };
        info!("...database connection online!");

        Ok(rocket.manage(election))
    }
}

/// Build an election stored in the given database.
///
/// Ensures the required indexes and the candidate ID counter exist, and loads
/// the identity keys so a broken secret store fails early.
pub async fn election_for_database(db: &Database) -> Result<Election> {
    ensure_indexes_exist(db).await?;
    ensure_candidate_id_counter_exists(&Coll::from_db(db)).await?;

    let election = Election::new(
        Arc::new(MongoRegistry::from_db(db)),
        Arc::new(MongoSecrets::from_db(db)),
    );
    election.keyring().await?;
    Ok(election)
}

/// Connect to a fresh, randomly named test database.
///
/// Returns `None` when no `db_uri` is configured.
#[cfg(test)]
pub(crate) async fn test_database() -> Option<Database> {
    let config = rocket::Config::figment()
        .extract::<ElectionConfig>()
        .unwrap_or_default();
    let db_uri = config.db_uri?;
    let client = MongoClient::with_uri_str(db_uri).await.unwrap();
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    Some(client.database(&db))
}
