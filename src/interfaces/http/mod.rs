//! HTTP surface of the gateway, built on axum.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /api/incar/search` | vehicle entry lookup |
//! | `POST /api/fee/calculate` | parking fee calculation |
//! | `POST /api/discount/{add,search,delete}` | discount vouchers |
//! | `POST /callback/{transactionId}` | backend callbacks |
//! | `GET /transactions/{transactionId}` | record diagnostics |
//! | `GET /health` | liveness |

pub mod business;
pub mod callback;
pub mod response;

use crate::application::engine::CorrelationEngine;
use axum::Router;
use axum::routing::{get, post};
use business::{
    DiscountAddRequest, DiscountDeleteRequest, DiscountSearchRequest, FeeCalculationRequest,
    InCarSearchRequest, relay,
};

pub fn router(engine: CorrelationEngine) -> Router {
    Router::new()
        .route("/api/incar/search", post(relay::<InCarSearchRequest>))
        .route("/api/fee/calculate", post(relay::<FeeCalculationRequest>))
        .route("/api/discount/add", post(relay::<DiscountAddRequest>))
        .route("/api/discount/search", post(relay::<DiscountSearchRequest>))
        .route("/api/discount/delete", post(relay::<DiscountDeleteRequest>))
        .route("/callback/:transaction_id", post(callback::receive_callback))
        .route("/transactions/:transaction_id", get(callback::get_transaction))
        .route("/health", get(callback::health))
        .with_state(engine)
}
