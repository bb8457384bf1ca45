use crate::{
    AppState,
    api::models::users::CurrentUser,
    config::Config,
    db::{errors::DbError, handlers::Users, models::users::UserCreateDBRequest},
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use tracing::{debug, instrument, trace};

/// Extract user from proxy header if present and valid
/// Returns:
/// - None: No proxy header present, or the user is unknown and auto-creation is off
/// - Some(Ok(user)): Valid proxy header found and user authenticated
/// - Some(Err(error)): Proxy header present but malformed, or user lookup/creation failed
#[instrument(skip(parts, config, db))]
async fn try_proxy_header_auth(parts: &Parts, config: &Config, db: &PgPool) -> Option<Result<CurrentUser>> {
    let header = parts.headers.get(&config.auth.proxy_header.header_name)?;

    let user_email = match header.to_str() {
        Ok(value) if !value.trim().is_empty() => value.trim(),
        Ok(_) => {
            return Some(Err(Error::BadRequest {
                message: "Empty user header".to_string(),
            }));
        }
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid user header: {e}"),
            }));
        }
    };

    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };
    let mut users = Users::new(&mut conn);

    match users.get_by_email(user_email).await {
        Ok(Some(user)) => return Some(Ok(CurrentUser::from(user))),
        Ok(None) if !config.auth.proxy_header.auto_create_users => return None,
        Ok(None) => {}
        Err(e) => return Some(Err(Error::Database(e))),
    }

    let create_request = UserCreateDBRequest {
        email: user_email.to_string(),
        display_name: None,
        is_admin: false,
    };
    match users.create(&create_request).await {
        Ok(user) => {
            debug!(user_id = %user.id, "Created user from proxy header");
            Some(Ok(CurrentUser::from(user)))
        }
        // Another request created the same user first
        Err(DbError::UniqueViolation { .. }) => match users.get_by_email(user_email).await {
            Ok(Some(user)) => Some(Ok(CurrentUser::from(user))),
            Ok(None) => Some(Err(Error::Database(DbError::NotFound))),
            Err(e) => Some(Err(Error::Database(e))),
        },
        Err(e) => Some(Err(Error::Database(e))),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_proxy_header_auth(parts, &state.config, &state.db).await {
            Some(Ok(user)) => {
                trace!("Found proxy header authenticated user: {}", user.id);
                Ok(user)
            }
            Some(Err(e)) => {
                trace!("Proxy header authentication failed: {:?}", e);
                Err(Error::Unauthenticated { message: None })
            }
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AppState,
        api::models::users::CurrentUser,
        db::handlers::Users,
        test_utils::{create_test_config, create_test_user},
    };
    use axum::{extract::FromRequestParts as _, http::request::Parts};
    use sqlx::PgPool;

    fn create_test_parts_with_header(header_name: &str, header_value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(header_name, header_value)
            .body(())
            .unwrap();

        let (parts, _body) = request.into_parts();
        parts
    }

    #[sqlx::test]
    async fn test_existing_user_extraction(pool: PgPool) {
        let state = AppState::builder().db(pool.clone()).config(create_test_config()).build();
        let test_user = create_test_user(&pool).await;

        let mut parts = create_test_parts_with_header("x-edupay-user", &test_user.email.to_uppercase());
        let current_user = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();

        assert_eq!(current_user.id, test_user.id);
        assert_eq!(current_user.email, test_user.email);
        assert!(!current_user.is_admin);
    }

    #[sqlx::test]
    async fn test_auto_create_nonexistent_user(pool: PgPool) {
        let state = AppState::builder().db(pool.clone()).config(create_test_config()).build();
        let new_email = "newstudent@example.com";

        let mut conn = pool.acquire().await.unwrap();
        assert!(Users::new(&mut conn).get_by_email(new_email).await.unwrap().is_none());

        let mut parts = create_test_parts_with_header("x-edupay-user", new_email);
        let current_user = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current_user.email, new_email);
        assert!(!current_user.is_admin);

        let created = Users::new(&mut conn).get_by_email(new_email).await.unwrap().unwrap();
        assert_eq!(created.id, current_user.id);
    }

    #[sqlx::test]
    async fn test_unknown_user_rejected_without_auto_create(pool: PgPool) {
        let mut config = create_test_config();
        config.auth.proxy_header.auto_create_users = false;
        let state = AppState::builder().db(pool.clone()).config(config).build();

        let mut parts = create_test_parts_with_header("x-edupay-user", "stranger@example.com");
        let error = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_missing_header_returns_unauthorized(pool: PgPool) {
        let state = AppState::builder().db(pool.clone()).config(create_test_config()).build();

        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();

        let error = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
