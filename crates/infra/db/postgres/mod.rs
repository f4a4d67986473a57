pub mod migrations;
pub mod postgres_connection;
pub mod schema;
