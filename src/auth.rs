// 🔐 Auth - Email/password identity and opaque session tokens
// Core-adjacent flows require a current identity; everything else answers
// "login required". Token expiry policy is deliberately out of scope.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("email already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("login required")]
    NotSignedIn,
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// Issues and resolves session tokens against the users table.
/// Tokens live in memory; a restart signs everyone out.
#[derive(Default)]
pub struct AuthService {
    tokens: Mutex<HashMap<String, User>>,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl AuthService {
    pub fn new() -> Self {
        AuthService {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new account and sign it in. Returns the session token.
    pub fn sign_up(
        &self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(|_| AuthError::InvalidCredentials)?;
        if existing.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.clone(),
        };
        let salt = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO users (id, email, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                email,
                hash_password(&salt, password),
                salt,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|_| AuthError::InvalidCredentials)?;

        Ok(self.issue_token(user))
    }

    /// Sign in with email and password. Returns the session token.
    pub fn sign_in(
        &self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let email = email.trim().to_lowercase();

        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT id, password_hash, salt FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|_| AuthError::InvalidCredentials)?;

        let (id, stored_hash, salt) = row.ok_or(AuthError::InvalidCredentials)?;
        if hash_password(&salt, password) != stored_hash {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.issue_token(User { id, email }))
    }

    /// Invalidate one session token. Unknown tokens are a quiet no-op,
    /// mirroring the original's forgiving sign-out.
    pub fn sign_out(&self, token: &str) {
        self.tokens.lock().unwrap().remove(token);
    }

    /// Resolve the identity behind a token, or "no session".
    pub fn current_user(&self, token: &str) -> Option<User> {
        self.tokens.lock().unwrap().get(token).cloned()
    }

    /// Like `current_user` but with the structured failure routes expect.
    pub fn require_user(&self, token: Option<&str>) -> Result<User, AuthError> {
        token
            .and_then(|t| self.current_user(t))
            .ok_or(AuthError::NotSignedIn)
    }

    fn issue_token(&self, user: User) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.tokens.lock().unwrap().insert(token.clone(), user);
        token
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_sign_up_and_current_user() {
        let conn = test_conn();
        let auth = AuthService::new();

        let token = auth.sign_up(&conn, "Ali@Example.com", "secret").unwrap();
        let user = auth.current_user(&token).unwrap();

        assert_eq!(user.email, "ali@example.com");
        assert!(uuid::Uuid::parse_str(&user.id).is_ok());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let conn = test_conn();
        let auth = AuthService::new();

        auth.sign_up(&conn, "ali@example.com", "secret").unwrap();
        let result = auth.sign_up(&conn, "ali@example.com", "other");

        assert_eq!(result.unwrap_err(), AuthError::EmailTaken);
    }

    #[test]
    fn test_sign_in_with_wrong_password() {
        let conn = test_conn();
        let auth = AuthService::new();
        auth.sign_up(&conn, "ali@example.com", "secret").unwrap();

        let result = auth.sign_in(&conn, "ali@example.com", "wrong");
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);

        let result = auth.sign_in(&conn, "nobody@example.com", "secret");
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn test_sign_in_issues_fresh_token() {
        let conn = test_conn();
        let auth = AuthService::new();
        let first = auth.sign_up(&conn, "ali@example.com", "secret").unwrap();

        let second = auth.sign_in(&conn, "ali@example.com", "secret").unwrap();

        assert_ne!(first, second);
        // Both tokens resolve to the same identity
        assert_eq!(
            auth.current_user(&first).unwrap().id,
            auth.current_user(&second).unwrap().id
        );
    }

    #[test]
    fn test_sign_out_invalidates_token() {
        let conn = test_conn();
        let auth = AuthService::new();
        let token = auth.sign_up(&conn, "ali@example.com", "secret").unwrap();

        auth.sign_out(&token);

        assert!(auth.current_user(&token).is_none());
        assert_eq!(
            auth.require_user(Some(&token)).unwrap_err(),
            AuthError::NotSignedIn
        );
    }

    #[test]
    fn test_require_user_without_token() {
        let auth = AuthService::new();
        assert_eq!(auth.require_user(None).unwrap_err(), AuthError::NotSignedIn);
    }

    #[test]
    fn test_password_hash_is_salted() {
        let conn = test_conn();
        let auth = AuthService::new();
        auth.sign_up(&conn, "a@example.com", "same").unwrap();
        auth.sign_up(&conn, "b@example.com", "same").unwrap();

        let hashes: Vec<String> = {
            let mut stmt = conn.prepare("SELECT password_hash FROM users").unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };

        assert_eq!(hashes.len(), 2);
        assert_ne!(hashes[0], hashes[1]);
    }
}
