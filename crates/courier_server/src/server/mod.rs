#![forbid(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod connection;
pub mod health;
pub mod http_api;
pub mod relay;
pub mod room_hub;



#[cfg(test)]
mod room_hub_tests;
