use crate::context::UserRole;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// The set of roles a bundle targets.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RoleSet: u8 {
        const ADMIN = 1 << 0;
        const MANAGER = 1 << 1;
        const CREATOR = 1 << 2;
        const CLIENT = 1 << 3;

        const ALL = Self::ADMIN.bits()
            | Self::MANAGER.bits()
            | Self::CREATOR.bits()
            | Self::CLIENT.bits();
    }
}

impl RoleSet {
    #[must_use]
    pub const fn targets(self, role: UserRole) -> bool {
        self.contains(Self::from_role(role))
    }

    const fn from_role(role: UserRole) -> Self {
        match role {
            UserRole::Admin => Self::ADMIN,
            UserRole::Manager => Self::MANAGER,
            UserRole::Creator => Self::CREATOR,
            UserRole::Client => Self::CLIENT,
        }
    }
}

impl From<UserRole> for RoleSet {
    fn from(role: UserRole) -> Self {
        Self::from_role(role)
    }
}

impl From<&str> for RoleSet {
    fn from(s: &str) -> Self {
        match s {
            "admin" => Self::ADMIN,
            "manager" => Self::MANAGER,
            "creator" => Self::CREATOR,
            "client" => Self::CLIENT,
            "all" | "*" => Self::ALL,
            _ => Self::empty(),
        }
    }
}

/// Serialized as a list of role names (`["admin", "manager"]`), which reads well in config files.
impl Serialize for RoleSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let names: Vec<&str> = [
            UserRole::Admin,
            UserRole::Manager,
            UserRole::Creator,
            UserRole::Client,
        ]
        .into_iter()
        .filter(|role| self.targets(*role))
        .map(UserRole::as_str)
        .collect();
        names.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(names.iter().fold(Self::empty(), |set, name| set | Self::from(name.as_str())))
    }
}
