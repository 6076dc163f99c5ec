pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, patch, post},
};

/// One flat router; role checks live in the handlers so public and
/// protected routes share the same middleware chain.
pub fn build_router(state: ApiState) -> Router {
    let auth_state = state.clone();
    let rate_state = state.clone();

    Router::new()
        .route("/healthz", get(handlers::health))
        .route(
            "/booths",
            get(handlers::booths::list).post(handlers::booths::create),
        )
        .route("/booths/area", get(handlers::booths::in_area))
        .route("/booths/nearby", get(handlers::booths::nearby))
        .route("/booths/stats/summary", get(handlers::booths::stats))
        .route("/booths/bulk", post(handlers::booths::bulk_create))
        .route(
            "/booths/by-number/{number}",
            get(handlers::booths::get_by_number),
        )
        .route(
            "/booths/by-polygon/{polygonId}",
            get(handlers::booths::get_by_polygon),
        )
        .route(
            "/booths/{id}",
            get(handlers::booths::get_by_id)
                .patch(handlers::booths::update)
                .delete(handlers::booths::delete),
        )
        .route(
            "/exhibitors",
            get(handlers::exhibitors::search).post(handlers::exhibitors::create),
        )
        .route("/exhibitors/import", post(handlers::exhibitors::import_csv))
        .route("/exhibitors/export", get(handlers::exhibitors::export_csv))
        .route(
            "/exhibitors/by-slug/{slug}",
            get(handlers::exhibitors::get_by_slug),
        )
        .route(
            "/exhibitors/{id}",
            get(handlers::exhibitors::get_by_id)
                .patch(handlers::exhibitors::update)
                .delete(handlers::exhibitors::delete),
        )
        .route(
            "/sectors",
            get(handlers::sectors::list).post(handlers::sectors::create),
        )
        .route(
            "/sectors/{id}",
            get(handlers::sectors::get_by_id)
                .patch(handlers::sectors::update)
                .delete(handlers::sectors::delete),
        )
        .route("/sectors/{id}/stats", get(handlers::sectors::stats))
        .route(
            "/themes",
            get(handlers::themes::list).post(handlers::themes::create),
        )
        .route(
            "/themes/by-slug/{slug}",
            get(handlers::themes::get_by_slug),
        )
        .route(
            "/themes/{id}",
            get(handlers::themes::get_by_id)
                .patch(handlers::themes::update)
                .delete(handlers::themes::delete),
        )
        .route(
            "/themes/{id}/exhibitors",
            post(handlers::themes::set_exhibitors),
        )
        .route(
            "/favorites",
            get(handlers::favorites::list)
                .post(handlers::favorites::add)
                .delete(handlers::favorites::clear),
        )
        .route(
            "/favorites/{exhibitorId}",
            delete(handlers::favorites::remove),
        )
        .route("/analytics/track", post(handlers::analytics::track))
        .route("/analytics/stats", get(handlers::analytics::stats))
        .route(
            "/analytics/top-exhibitors",
            get(handlers::analytics::top_exhibitors),
        )
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/register", post(handlers::auth::register))
        .route("/users", get(handlers::users::list))
        .route("/users/stats/summary", get(handlers::users::stats))
        .route("/users/{id}/approve", patch(handlers::users::approve))
        .route("/users/{id}/reject", post(handlers::users::reject))
        .route("/users/{id}/role", patch(handlers::users::set_role))
        .route(
            "/users/{id}",
            get(handlers::users::get_by_id).delete(handlers::users::delete),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::authenticate,
        ))
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::rate_limit,
        ))
        .layer(axum_middleware::from_fn(middleware::render_error_envelope))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
