mod account;
mod authorization;
mod cert;
mod client;
mod config;
mod controller;
mod directory;
pub mod domain;
pub mod eab;
mod error;
mod helpers;
mod jws;
mod order;
mod protocol;

pub use account::*;
pub use authorization::*;
pub use cert::*;
pub use client::*;
pub use config::*;
pub use controller::*;
pub use directory::*;
pub use error::Error;
pub use error::ServerError;
pub use helpers::gen_ec_private_key;
pub use helpers::gen_rsa_private_key;
pub use helpers::Identifier;
pub use order::*;
pub use protocol::*;
