pub mod connection;
pub mod health_check;
pub mod proxy;
pub mod worker;
