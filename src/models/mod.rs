pub mod log_line;
pub mod workload;

pub use log_line::*;
pub use workload::*;
