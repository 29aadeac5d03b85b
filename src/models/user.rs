use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::models::{Event, ParseEnumError, Recipient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            "user" => Ok(Role::User),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// Кто выполняет операцию. Передаётся в каждую операцию жизненного цикла явно.
///
/// `account_id` is the subject id of the role: the client id for clients,
/// the user id for end-users and the admin id for admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub role: Role,
    pub account_id: i64,
}

impl Actor {
    pub fn admin(account_id: i64) -> Self {
        Self { role: Role::Admin, account_id }
    }

    pub fn client(account_id: i64) -> Self {
        Self { role: Role::Client, account_id }
    }

    pub fn user(account_id: i64) -> Self {
        Self { role: Role::User, account_id }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_manage(&self, event: &Event) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Client => event.client_id == self.account_id,
            Role::User => false,
        }
    }

    /// Actor acting as the owning client (admin notifications go out only in this case).
    pub fn is_owner_of(&self, event: &Event) -> bool {
        self.role == Role::Client && event.client_id == self.account_id
    }

    pub fn as_recipient(&self) -> Recipient {
        Recipient::new(self.role, self.account_id)
    }
}

// Учетная запись для входа
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub subject_id: i64,
}

impl Account {
    pub fn actor(&self) -> Actor {
        Actor { role: self.role, account_id: self.subject_id }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub subject_id: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = ParseEnumError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            role: row.role.parse()?,
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            subject_id: row.subject_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}
