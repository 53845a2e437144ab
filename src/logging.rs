use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

/// Identifies a single request in the logs, and records when it arrived.
#[derive(Debug, Copy, Clone)]
pub struct RequestTag {
    pub id: usize,
    pub received: Instant,
}

impl Display for RequestTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "req{}", self.id)
    }
}

impl RequestTag {
    /// Tag a newly arrived request. IDs wrap around to zero on overflow.
    pub fn next() -> RequestTag {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestTag {
            id: REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            received: Instant::now(),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestTag {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(req.local_cache(RequestTag::next))
    }
}

/// Logs every request and response, with timings.
///
/// Request bodies are never logged, since they carry national IDs and names.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let protocol = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let ip = &rocket.config().address;
        let port = &rocket.config().port;
        info!("Ballot server launched on {protocol}://{ip}:{port}");
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let tag = req.local_cache(RequestTag::next);
        info!("->{tag} {} {}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let tag = req.local_cache(RequestTag::next);
        let elapsed = tag.received.elapsed();
        let code = res.status();
        let route = req
            .route()
            .map(|route| match route.name {
                Some(ref name) => format!("{name} ({})", route.uri),
                None => route.uri.to_string(),
            })
            .unwrap_or_else(|| "UNKNOWN ROUTE".to_string());

        let log_msg = format!("<-{tag} {code} {route} in {}ms", elapsed.as_millis());
        match code.class() {
            StatusClass::ServerError => error!("{log_msg}"),
            StatusClass::ClientError => warn!("{log_msg}"),
            _ => info!("{log_msg}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, no further ballots will be accepted");
    }
}
