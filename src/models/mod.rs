//! Request and Response models for the cache server API
//!
//! This module defines the DTOs used for serializing/deserializing HTTP
//! request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::SetRequest;
pub use responses::{
    ClearResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse, SetResponse,
    StatsResponse,
};
