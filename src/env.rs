//! Deployment environment, read from the `APP_ENV` variable.
//!
//! The container itself gives no meaning to the environment: it is a regular capability that
//! providers can depend on to specialise their wiring, for example to start an ephemeral backing
//! service outside of production.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::{Node, Tsumiki, WiringError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("unknown environment {0:?}, expected one of prod, dev, test")]
    Unknown(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    pub const VARIABLE: &'static str = "APP_ENV";

    /// Read the environment from the `APP_ENV` variable, defaulting to development if unset
    pub fn from_env() -> Result<Self, EnvironmentError> {
        Self::from_value(std::env::var(Self::VARIABLE).ok().as_deref())
    }

    pub fn from_value(value: Option<&str>) -> Result<Self, EnvironmentError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(value) => value.parse(),
        }
    }

    pub fn is_prod(&self) -> bool {
        *self == Environment::Production
    }

    pub fn is_dev(&self) -> bool {
        *self == Environment::Development
    }

    pub fn is_test(&self) -> bool {
        *self == Environment::Test
    }

    pub fn is_not_prod(&self) -> bool {
        !self.is_prod()
    }
}

impl FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Production),
            "dev" | "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            _ => Err(EnvironmentError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Production => "prod",
            Environment::Development => "dev",
            Environment::Test => "test",
        })
    }
}

impl Tsumiki {
    /// Declare a node reading the environment when first resolved
    pub fn environment(&self) -> Result<Node<Environment>, WiringError> {
        self.try_declare(Environment::from_env, &[])
    }
}
