use rocket::Route;

mod balloting;
mod public;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(public::routes());
    routes.extend(balloting::routes());
    routes
}
