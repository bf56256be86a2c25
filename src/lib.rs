//! Serial harness for PUF measurements.
//!
//! The device is power-cycled over a GPIO line, then streams a framed response
//! over a serial link. Two-byte markers delimit the response and drive a small
//! protocol: the device announces when it is loaded, asks for parameters one at
//! a time, and reports completion or a fatal fault. Captured responses land in
//! `<prefix><n>.bin` files, or in memory when a single response is turned into
//! a key by [`keygen`].

use thiserror::Error;

pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod keygen;
pub mod power;
pub mod protocol;
pub mod serial;

pub use keygen::KeyExtractionError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("gpio error: {0}")]
    Gpio(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("parameter feeder failed: {0}")]
    Feeder(String),

    #[error("capture sink already finalized")]
    SinkFinalized,

    #[error("key extraction failed: {0}")]
    KeyExtraction(#[from] KeyExtractionError),
}

pub type Result<T> = std::result::Result<T, Error>;
