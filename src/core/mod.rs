pub mod discovery;
pub mod executor;
pub mod publisher;
pub mod reading;
pub mod sensor;
pub mod transport;
