//! API Module
//!
//! HTTP handlers and routing for the invalidation admin API.
//!
//! # Endpoints
//! - `DELETE /entities/:entity/:id` - Evict results referencing an entity
//! - `GET /entities/:entity/:id` - List keys referencing an entity
//! - `DELETE /functions/:name` - Evict every result of a function
//! - `POST /calls/invalidate` - Evict one exact call
//! - `POST /calls/key` - Compute the key of a call
//! - `DELETE /all` - Evict everything in the namespace
//! - `GET /stats` - Get engine statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
