use rocket::{serde::json::Json, Route, State};

use crate::election::Election;
use crate::error::Result;
use crate::model::api::CandidateDesc;

pub fn routes() -> Vec<Route> {
    routes![ping, get_all_candidates]
}

#[get("/")]
fn ping() -> &'static str {
    "pong"
}

#[get("/api/get_all_candidates")]
async fn get_all_candidates(election: &State<Election>) -> Result<Json<Vec<CandidateDesc>>> {
    let candidates = election
        .get_all_candidates()
        .await?
        .into_iter()
        .map(CandidateDesc::from)
        .collect();
    Ok(Json(candidates))
}
