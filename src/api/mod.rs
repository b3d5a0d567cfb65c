pub mod middleware;
pub mod routes;

pub use middleware::log_request_errors;
pub use routes::{cancel, compress, download, index, progress, redirect_to_index};
