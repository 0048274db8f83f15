//! Unit identity within a peer group

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a unit, in `application/number` form.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct UnitName(String);

impl UnitName {
    /// Creates a unit name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The full unit name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The application part of the name.
    #[must_use]
    pub fn application(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(app, _)| app)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for UnitName {
    fn from(name: String) -> Self {
        Self(name)
    }
}
