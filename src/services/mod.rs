// src/services/mod.rs

//! Demo services built on the session engine.
//!
//! Each service method returns a [`Handler`](crate::Handler) for one call.
//! Request and response types are plain `Facet` structs.

pub mod blog;
pub mod calculator;
pub mod greet;

pub use blog::BlogService;
pub use calculator::CalculatorService;
pub use greet::GreetService;
