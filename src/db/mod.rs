pub mod cleaner;
pub mod connection;

pub use cleaner::cleanup_table;
pub use connection::connect_and_ping;
