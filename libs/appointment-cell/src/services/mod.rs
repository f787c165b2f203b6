pub mod access;
pub mod booking;
pub mod dispatcher;
pub mod lifecycle;
pub mod sinks;
