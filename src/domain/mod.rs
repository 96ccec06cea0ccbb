pub mod drift;
pub mod models;
pub mod ticking;
pub mod transition;
