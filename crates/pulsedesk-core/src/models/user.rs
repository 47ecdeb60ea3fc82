use serde::{Deserialize, Serialize};

/// Role assigned to an account at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Doctor,
    Admin,
    /// Any role string this client does not know about
    #[serde(untagged)]
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::Other(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "doctor" => Role::Doctor,
            "admin" => Role::Admin,
            other => Role::Other(other.to_string()),
        })
    }
}

/// Identity record returned by the backend on login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn display_name(&self) -> String {
        match self.email {
            Some(ref email) => format!("{} ({})", email, self.role),
            None => format!("user #{} ({})", self.id, self.role),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_user() {
        let json = r#"{"id": 1, "email": "a@x.com", "role": "doctor"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.role, Role::Doctor);
        assert!(!user.is_admin());
        assert_eq!(user.display_name(), "a@x.com (doctor)");
    }

    #[test]
    fn test_user_without_email() {
        let user: User = serde_json::from_str(r#"{"id": 7, "role": "admin"}"#).unwrap();
        assert!(user.is_admin());
        assert_eq!(user.display_name(), "user #7 (admin)");
    }

    #[test]
    fn test_unknown_role_preserved() {
        let user: User = serde_json::from_str(r#"{"id": 2, "role": "nurse"}"#).unwrap();
        assert_eq!(user.role, Role::Other("nurse".to_string()));
        assert_eq!(serde_json::to_value(&user.role).unwrap(), "nurse");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(serde_json::to_value(Role::default()).unwrap(), "doctor");
    }
}
