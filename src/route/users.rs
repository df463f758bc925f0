use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::config::Config;
use crate::data::store::Store;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{LoginData, RegisterData, UserDbExt};
use crate::data::user::UserResponse;
use crate::resp::jwt::{UserRoleToken, AUTH_COOKIE_NAME};
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::security::Security;

/// Exchange email + password for an auth cookie.
#[utoipa::path(
    request_body = LoginData,
    responses(
        (status = 200, description = "Authenticated; JWT cookie set", body = UserResponse),
        (status = 401, description = "Bad email or password", body = Problem),
    )
)]
#[post("/login", format = "application/json", data = "<login>")]
#[tracing::instrument(skip(cookies, db, security))]
pub async fn login_submit<'a>(
    login: Json<LoginData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Store>,
    security: &State<Security>,
) -> Result<Json<UserResponse>, Problem> {
    let user = db.login_user(&login.0, &security.salt).await?;

    let urt = UserRoleToken::new(&user);
    cookies.add(urt.cookie(&security.jwt_keys.private)?);

    Ok(Json(UserResponse::from(user)))
}

/// Register an account. Admin-only, except for the very first account,
/// which bootstraps the instance.
#[utoipa::path(
    request_body = RegisterData,
    responses(
        (status = 200, description = "Created account", body = UserResponse),
        (status = 400, description = "Validation failure", body = Problem),
        (status = 403, description = "Caller isn't an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/register", format = "application/json", data = "<register>")]
#[tracing::instrument(skip(db, c, security))]
pub async fn register_submit(
    register: Json<RegisterData>,
    auth: Option<UserRoleToken>,
    db: &State<Store>,
    c: &State<Config>,
    security: &State<Security>,
) -> Result<Json<UserResponse>, Problem> {
    let is_admin = auth.map(|a| a.role >= Role::Admin).unwrap_or(false);
    if !is_admin && db.count_users().await? > 0 {
        return Err(problems::forbidden("Only admins can register accounts."));
    }

    let user = db
        .create_user(&register.0, &security.salt, &c.admin_emails)
        .await?;

    Ok(Json(UserResponse::from(user)))
}

/// Claims of the presented token.
#[utoipa::path(
    responses(
        (status = 200, description = "Decoded token claims"),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/whoami")]
#[tracing::instrument]
pub async fn whoami(auth: UserRoleToken) -> Json<UserRoleToken> {
    Json(auth)
}

/// Delete an account; admins may delete anyone, others only themselves.
#[utoipa::path(
    params(("id", description = "user ID")),
    responses(
        (status = 200, description = "Removed user id"),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 404, description = "Queried user doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/users/<id>")]
#[tracing::instrument(skip(cookies, db))]
pub async fn user_delete<'a>(
    id: Uuid,
    auth: UserRoleToken,
    cookies: &'a CookieJar<'_>,
    db: &State<Store>,
) -> Result<String, Problem> {
    if auth.user != id && auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can delete other accounts."));
    }

    let removed = db.delete_user(id).await?;

    if let Some(removed) = removed {
        if auth.user == id {
            cookies.remove(AUTH_COOKIE_NAME);
        }
        Ok(removed.id.to_string())
    } else {
        Err(user_problem::not_found(id))
    }
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod user_endpoints {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use uuid::Uuid;

    use crate::data::store::Store;
    use crate::data::user::db::UserDbExt;
    use crate::data::user::{User, UserResponse};
    use crate::resp::jwt::{HasAuthCookie, UserRoleToken};
    use crate::role::Role;
    use crate::security::Security;

    async fn client() -> Client {
        Client::tracked(crate::create(None).await.expect("invalid backend"))
            .await
            .expect("valid rocket instance")
    }

    fn admin_cookie(security: &Security) -> rocket::http::Cookie<'static> {
        let mut admin = User::new("admin@college.example", "admin_pass_123", &security.salt);
        admin.role = Role::Admin;
        UserRoleToken::new(&admin)
            .cookie(&security.jwt_keys.private)
            .expect("unable to encode admin cookie")
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_register_then_login_works() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();
        let db: &Store = client.rocket().state().unwrap();

        let email = format!("employee-{}@college.example", Uuid::new_v4());
        let body = format!(r#"{{"email":"{}","password":"hunter2hunter2"}}"#, email);

        let response = client
            .post("/api/v1/register")
            .header(ContentType::JSON)
            .cookie(admin_cookie(security))
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");

        let created: UserResponse = response.into_json().await.expect("invalid response json");
        assert_eq!(created.role, Role::Employee);

        let response = client
            .post("/api/v1/login")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");
        assert!(
            response
                .get_auth_cookie(&security.jwt_keys.public)
                .is_some(),
            "jwt_auth cookie wasn't present"
        );

        db.delete_user(created.id)
            .await
            .expect("unable to delete test user");
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_register_rejects_non_admins() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();
        let db: &Store = client.rocket().state().unwrap();

        let intruder = User::new("intruder@college.example", "hunter2hunter2", &security.salt);
        let cookie = UserRoleToken::new(&intruder)
            .cookie(&security.jwt_keys.private)
            .expect("unable to encode cookie");

        // A non-admin can only bootstrap an empty instance.
        if db.count_users().await.expect("unable to count users") == 0 {
            return;
        }

        let response = client
            .post("/api/v1/register")
            .header(ContentType::JSON)
            .cookie(cookie)
            .body(r#"{"email":"new@college.example","password":"hunter2hunter2"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_whoami_requires_auth() {
        let client = client().await;

        let response = client.get("/api/v1/whoami").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
