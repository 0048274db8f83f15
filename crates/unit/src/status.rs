use std::fmt;
use std::str::FromStr;

/// The four status states an operator can see.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusKind {
    /// Running normally.
    Active,

    /// Needs operator intervention.
    Blocked,

    /// Busy with a long-running local operation.
    Maintenance,

    /// Waiting on something outside the unit.
    Waiting,
}

impl StatusKind {
    /// Name used by the host tools.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Maintenance => "maintenance",
            Self::Waiting => "waiting",
        }
    }
}

impl FromStr for StatusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "maintenance" => Ok(Self::Maintenance),
            "waiting" => Ok(Self::Waiting),
            other => Err(other.to_string()),
        }
    }
}

/// Unit status plus its free-text message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitStatus {
    kind: StatusKind,
    message: String,
}

impl UnitStatus {
    /// Creates a status of the given kind.
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Active status.
    pub fn active(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Active, message)
    }

    /// Blocked status.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Blocked, message)
    }

    /// Maintenance status.
    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Maintenance, message)
    }

    /// Waiting status.
    pub fn waiting(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Waiting, message)
    }

    /// The status kind.
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        self.kind
    }

    /// The status message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the unit is blocked.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.kind == StatusKind::Blocked
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}
