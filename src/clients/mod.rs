pub mod circuit_breaker;
pub mod containers;
pub mod inference;
