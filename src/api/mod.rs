use rocket::Route;

mod common;
mod polls;
mod profile;
mod results;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(polls::routes());
    routes.extend(voting::routes());
    routes.extend(results::routes());
    routes.extend(profile::routes());
    routes
}
