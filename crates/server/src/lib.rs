pub mod errors;
pub mod json;
pub mod routes;
pub mod startup;

pub use startup::run;
