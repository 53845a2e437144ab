use log::info;
use rocket::{
    http::Status,
    response::status,
    serde::json::Json,
    Route, State,
};

use crate::election::Election;
use crate::error::{Error, Result};
use crate::logging::RequestTag;
use crate::model::{
    api::{CountBallotRequest, CountBallotResponse},
    ballot::{Ballot, BallotStatus},
    candidate::CandidateId,
};

pub fn routes() -> Vec<Route> {
    routes![count_ballot]
}

#[post("/api/count_ballot", data = "<request>", format = "json")]
async fn count_ballot(
    tag: &RequestTag,
    request: Json<CountBallotRequest>,
    election: &State<Election>,
) -> Result<status::Custom<Json<CountBallotResponse>>> {
    let request = request.into_inner();
    let candidate_id = request
        .chosen_candidate_id
        .parse::<CandidateId>()
        .map_err(|_| Error::BadRequest(format!("Invalid candidate ID '{}'", request.chosen_candidate_id)))?;

    let ballot = Ballot::new(request.ballot_number, candidate_id, request.voter_comments);
    let result = election.count_ballot(ballot, &request.voter_national_id).await?;
    info!("{tag} ballot outcome: {}", result.as_str());

    let code = match result {
        BallotStatus::BallotCounted => Status::Accepted,
        _ => Status::Conflict,
    };
    Ok(status::Custom(code, Json(result.into())))
}

#[cfg(test)]
mod tests {
    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;
    use rocket::serde::json::serde_json::json;

    use crate::model::{binding::BallotNumber, voter::VoterStatus};

    use super::*;

    async fn submit(client: &Client, request: &CountBallotRequest) -> (Status, CountBallotResponse) {
        let response = client
            .post(uri!(count_ballot))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap())
    }

    #[backend_test(seeded)]
    async fn count_then_fraud(client: Client, election: Election) {
        let ballot = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let request = CountBallotRequest::example(ballot, "2", "111-11-1111");
        let (status, body) = submit(&client, &request).await;
        assert_eq!(status, Status::Accepted);
        assert_eq!(body.status, BallotStatus::BallotCounted.to_string());

        let ballot = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let request = CountBallotRequest::example(ballot, "2", "111-11-1111");
        let (status, body) = submit(&client, &request).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body.status, BallotStatus::FraudCommitted.to_string());
        assert_eq!(
            election.get_voter_status("111-11-1111").await.unwrap(),
            VoterStatus::FraudCommitted
        );
    }

    #[backend_test(seeded)]
    async fn rejected_ballots_conflict(client: Client, election: Election) {
        let request = CountBallotRequest::example(BallotNumber::from("bogus"), "1", "222-22-2222");
        let (status, body) = submit(&client, &request).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body.status, BallotStatus::InvalidBallot.to_string());

        let ballot = election.issue_ballot("222-22-2222").await.unwrap().unwrap();
        let request = CountBallotRequest::example(ballot, "1", "999-99-9999");
        let (status, body) = submit(&client, &request).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body.status, BallotStatus::VoterNotRegistered.to_string());
    }

    #[backend_test(seeded)]
    async fn non_numeric_candidate(client: Client, election: Election) {
        let ballot = election.issue_ballot("333-33-3333").await.unwrap().unwrap();
        let request = CountBallotRequest::example(ballot.clone(), "Rose Hervey", "333-33-3333");
        let response = client
            .post(uri!(count_ballot))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        assert!(election.store().get_ballot(&ballot).await.unwrap().unwrap().is_uncast());
    }

    #[backend_test]
    async fn malformed_body(client: Client) {
        let response = client
            .post(uri!(count_ballot))
            .header(ContentType::JSON)
            .body(r#"{"ballot_number": 5}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }
}
