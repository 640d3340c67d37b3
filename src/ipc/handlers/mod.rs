pub mod analysis;
pub mod assignments;
pub mod classes;
pub mod core;
pub mod resources;
pub mod responses;
pub mod stats;
pub mod submissions;
pub mod topics;
