use crypto::bcrypt::bcrypt;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::role::Role;
use crate::security::Salt;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

/// bcrypt over a sha256 pre-hash, so password length doesn't leak into
/// bcrypt's 72-byte input limit.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash([u8; 24]);

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, salt: &Salt) -> PasswordHash {
        let mut pw_hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, password.as_ref().as_bytes());

        bcrypt(10, salt, sha.finalize().as_slice(), &mut pw_hash);

        PasswordHash(pw_hash)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    pub pw_hash: PasswordHash,
    pub role: Role,
}

impl User {
    pub fn new(email: impl AsRef<str>, password: impl AsRef<str>, salt: &Salt) -> User {
        let email = email.as_ref().trim().to_lowercase();
        let pw_hash = PasswordHash::new(password, salt);

        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes());
        tracing::info!("Creating a new user with UUID: {}", id);

        User {
            id,
            email,
            pw_hash,
            role: Role::Employee,
        }
    }
}

/// What callers get to see of an account; never the hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_same_salt_same_hash() {
        let salt: Salt = [7; 16];
        assert_eq!(
            PasswordHash::new("correct horse", &salt),
            PasswordHash::new("correct horse", &salt)
        );
        assert_ne!(
            PasswordHash::new("correct horse", &salt),
            PasswordHash::new("battery staple", &salt)
        );
    }

    #[test]
    fn emails_are_normalized() {
        let salt: Salt = [7; 16];
        let user = User::new("  Staff@College.Example ", "hunter2hunter2", &salt);
        assert_eq!(user.email, "staff@college.example");
        // Identity is derived from the normalized email.
        assert_eq!(
            user.id,
            Uuid::new_v5(&Uuid::NAMESPACE_OID, b"staff@college.example")
        );
    }
}
