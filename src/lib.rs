pub mod clock;
pub mod config;
pub mod console;
pub mod logic;
pub mod routes;
pub mod session;
