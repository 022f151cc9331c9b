//! Ambient, caller-supplied load signals. Never persisted.

use serde::{Deserialize, Serialize};

/// Plain-data signals the bundle recommendation chain evaluates.
///
/// Every field is optional; an empty context only triggers strategy defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadContext {
    pub role: Option<UserRole>,
    pub device: Option<DeviceType>,
    pub current_page: Option<String>,
    pub activity: Option<ActivityClass>,
    pub connection: Option<ConnectionSpeed>,
}

impl LoadContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    #[must_use]
    pub const fn device(mut self, device: DeviceType) -> Self {
        self.device = Some(device);
        self
    }

    #[must_use]
    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.current_page = Some(page.into());
        self
    }

    #[must_use]
    pub const fn activity(mut self, activity: ActivityClass) -> Self {
        self.activity = Some(activity);
        self
    }

    #[must_use]
    pub const fn connection(mut self, connection: ConnectionSpeed) -> Self {
        self.connection = Some(connection);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    Creator,
    Client,
}

impl UserRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Creator => "creator",
            Self::Client => "client",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Tablet,
    Mobile,
}

/// How established the user is in the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityClass {
    New,
    Casual,
    Regular,
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionSpeed {
    Slow,
    Medium,
    Fast,
}
