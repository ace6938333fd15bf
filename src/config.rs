//! This module holds the configuration for the server

use std::net::IpAddr;

use actix_toolbox::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Configuration regarding the server
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConfig {
    /// The address the server should bind to
    pub listen_address: IpAddr,
    /// The port the server should bind to
    pub listen_port: u16,
}

/// Configuration regarding the database
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct DBConfig {
    /// The host the database is running on
    pub host: String,
    /// The port the database is running on
    pub port: u16,
    /// The name of the database to connect to
    pub name: String,
    /// The user to use for the database connection
    pub user: String,
    /// Password for the user
    pub password: String,
}

/// Configuration regarding the issued bearer tokens
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct AuthConfig {
    /// The secret the tokens are signed with.
    ///
    /// Anyone who knows this value can forge valid tokens.
    pub secret_key: String,
    /// The lifetime of an issued token in seconds
    pub token_lifetime: u64,
}

/// This struct can be parsed from the configuration file
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Configuration regarding the server
    pub server: ServerConfig,
    /// Configuration regarding the database
    pub database: DBConfig,
    /// Configuration regarding authentication
    pub authentication: AuthConfig,
    /// The logging configuration
    pub logging: LoggingConfig,
}
