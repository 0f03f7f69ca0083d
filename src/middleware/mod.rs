// Cross-cutting HTTP concerns

pub mod cors;

pub use cors::cors_layer;
