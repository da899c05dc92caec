use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::{User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::services::email::two_factor_email;
use crate::AppState;

/// bcrypt cost for account passwords.
pub const USER_PASSWORD_COST: u32 = 10;
/// bcrypt cost for gallery passwords, checked on every unlock.
pub const GALLERY_PASSWORD_COST: u32 = 8;

const TWO_FACTOR_CODE_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Result of a password login.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated { user: User, token: String },
    /// Two-factor is on: a code was mailed and must be confirmed.
    CodeSent,
}

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(password, cost)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
}

/// Constant-time bcrypt check; a malformed hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..TWO_FACTOR_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub struct AuthService;

impl AuthService {
    /// Create a signed JWT for a user id
    pub fn create_jwt(state: &Arc<AppState>, user_id: i64) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(state.config.jwt.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a JWT, returning the claims
    pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Get user from JWT token
    pub async fn get_user_from_token(state: &Arc<AppState>, token: &str) -> AppResult<User> {
        let claims = Self::decode_jwt(state, token)?;
        let id: i64 = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;
        let user = UserRepository::find_by_id(&state.db, id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(user)
    }

    /// Check credentials. With two-factor enabled a fresh code is stored and
    /// mailed instead of issuing a token.
    pub async fn login(
        state: &Arc<AppState>,
        email: &str,
        password: &str,
    ) -> AppResult<LoginOutcome> {
        let user = UserRepository::find_by_email(&state.db, email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &user.password) {
            tracing::warn!("Failed login attempt for {}", email);
            return Err(AppError::Unauthorized);
        }

        if state.config.client.two_factor {
            let code = generate_code();
            UserRepository::set_auth_code(&state.db, user.id, Some(&code)).await?;
            state
                .mailer
                .send(two_factor_email(&user.email, &code))
                .await?;
            tracing::info!("Two-factor code sent to user {}", user.id);
            return Ok(LoginOutcome::CodeSent);
        }

        let token = Self::create_jwt(state, user.id)?;
        Ok(LoginOutcome::Authenticated { user, token })
    }

    /// Exchange a mailed two-factor code for a token. Codes are single use.
    pub async fn verify_code(
        state: &Arc<AppState>,
        email: &str,
        code: &str,
    ) -> AppResult<(User, String)> {
        let user = UserRepository::find_by_email(&state.db, email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        match user.auth_code.as_deref() {
            Some(expected) if !code.is_empty() && expected == code => {}
            _ => {
                tracing::warn!("Invalid two-factor code for user {}", user.id);
                return Err(AppError::Unauthorized);
            }
        }

        UserRepository::set_auth_code(&state.db, user.id, None).await?;
        let token = Self::create_jwt(state, user.id)?;
        Ok((user, token))
    }

    /// First-run bootstrap: only possible while no account exists.
    pub async fn create_admin(state: &Arc<AppState>, email: &str, password: &str) -> AppResult<User> {
        validate_credentials(email, password)?;
        if UserRepository::count(&state.db).await? > 0 {
            return Err(AppError::Forbidden);
        }
        let hash = hash_password(password, USER_PASSWORD_COST)?;
        let user = UserRepository::create(&state.db, email.trim(), &hash).await?;
        tracing::info!("Administrator account {} created", user.id);
        Ok(user)
    }

    pub async fn update_user(
        state: &Arc<AppState>,
        id: i64,
        email: &str,
        password: Option<&str>,
    ) -> AppResult<User> {
        if email.trim().is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }
        let hash = match password.filter(|p| !p.is_empty()) {
            Some(p) => Some(hash_password(p, USER_PASSWORD_COST)?),
            None => None,
        };
        UserRepository::update(&state.db, id, email.trim(), hash.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

fn validate_credentials(email: &str, password: &str) -> AppResult<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::tests::RecordingMailer;
    use crate::services::email::TWO_FACTOR_SUBJECT;
    use crate::services::init::tests::test_state;
    use crate::services::redeploy::tests::CountingRedeployer;

    #[test]
    fn codes_are_six_digits() {
        let code = generate_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("hunter2", 4).unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }

    #[tokio::test]
    async fn admin_bootstrap_only_once_and_login_issues_token() {
        let state = test_state(
            Arc::new(RecordingMailer::default()),
            Arc::new(CountingRedeployer::default()),
        )
        .await;

        let admin = AuthService::create_admin(&state, "admin@example.com", "secret")
            .await
            .unwrap();
        assert!(matches!(
            AuthService::create_admin(&state, "other@example.com", "secret").await,
            Err(AppError::Forbidden)
        ));

        let outcome = AuthService::login(&state, "ADMIN@example.com", "secret").await.unwrap();
        let LoginOutcome::Authenticated { user, token } = outcome else {
            panic!("expected a token");
        };
        assert_eq!(user.id, admin.id);
        assert_eq!(
            AuthService::get_user_from_token(&state, &token).await.unwrap().id,
            admin.id
        );

        assert!(matches!(
            AuthService::login(&state, "admin@example.com", "wrong").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn two_factor_code_is_mailed_and_single_use() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = test_state(mailer.clone(), Arc::new(CountingRedeployer::default())).await;
        let mut config = state.config.clone();
        config.client.two_factor = true;
        let state = Arc::new(crate::AppState {
            db: state.db.clone(),
            config,
            store: state.store.clone(),
            mailer: state.mailer.clone(),
            redeployer: state.redeployer.clone(),
            started_at: state.started_at,
        });

        AuthService::create_admin(&state, "admin@example.com", "secret").await.unwrap();
        assert!(matches!(
            AuthService::login(&state, "admin@example.com", "secret").await.unwrap(),
            LoginOutcome::CodeSent
        ));

        let code = {
            let sent = mailer.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].subject, TWO_FACTOR_SUBJECT);
            sent[0]
                .html
                .split("<strong>")
                .nth(1)
                .and_then(|s| s.split("</strong>").next())
                .unwrap()
                .to_string()
        };

        assert!(AuthService::verify_code(&state, "admin@example.com", "000000x").await.is_err());
        let (_, token) = AuthService::verify_code(&state, "admin@example.com", &code)
            .await
            .unwrap();
        assert!(!token.is_empty());
        assert!(AuthService::verify_code(&state, "admin@example.com", &code).await.is_err());
    }
}
