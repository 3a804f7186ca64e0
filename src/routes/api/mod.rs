pub mod companies;
pub mod jobs;
pub mod scrape;

use axum::Router;
use axum::routing::get;

use crate::routes::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Jobs
        .route("/jobs", get(jobs::list))
        .route("/jobs/", get(jobs::list))
        .route("/jobs/{id}", get(jobs::get))
        .route("/jobs/{id}/", get(jobs::get))
        // Companies
        .route("/companies", get(companies::list))
        .route("/companies/", get(companies::list))
        .route("/companies/{id}", get(companies::get))
        .route("/companies/{id}/", get(companies::get))
        // Scrape runs
        .route("/scrape", get(scrape::status).post(scrape::trigger))
        .route("/scrape/", get(scrape::status).post(scrape::trigger))
        .with_state(state);

    Router::new().nest("/api", api)
}
