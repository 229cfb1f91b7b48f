pub mod config;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod matcher;
pub mod model;
pub mod report;
pub mod results;
pub mod retry;
pub mod scenario;
pub mod scheduler;
pub mod vars;
