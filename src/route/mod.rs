use axum::Router;

use crate::context::Context;

pub mod recordings;

pub fn route() -> Router<Context> {
    Router::new().merge(recordings::route())
}
