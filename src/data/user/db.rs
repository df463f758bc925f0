use bson::doc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{PasswordHash, User, USER_COLLECTION_NAME};
use crate::data::filter;
use crate::data::store::Store;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Salt;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "User doesn't exist.")
            .insert_str("id", id)
            .to_owned()
    }

    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Bad email or password.")
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for LoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoginData:{}", self.email)
    }
}

impl LoginData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.email.contains('@') || self.password.len() < 6 || self.password.len() > 1024 {
            return Err(problem::bad_login());
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct RegisterData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl std::fmt::Debug for RegisterData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterData:{}", self.email)
    }
}

impl RegisterData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.email.contains('@') {
            return Err(problem::bad_email(
                self.email.clone(),
                "Not a valid e-mail address.",
            ));
        }
        if self.password.len() < 6 {
            return Err(problem::bad_password(
                "Password must be at least 6 characters (bytes) long.",
            ));
        }
        if self.password.len() > 1024 {
            return Err(problem::bad_password(
                "Passwords longer than 1024 characters aren't supported.",
            ));
        }
        Ok(())
    }
}

pub trait UserDbExt {
    async fn create_user(
        &self,
        register: &RegisterData,
        salt: &Salt,
        admin_emails: impl AsRef<[String]>,
    ) -> Result<User, Problem>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem>;
    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem>;
    async fn count_users(&self) -> Result<u64, Problem>;

    async fn login_user(&self, login: &LoginData, salt: &Salt) -> Result<User, Problem>;
    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, Problem>;
}

impl UserDbExt for Store {
    async fn create_user(
        &self,
        register: &RegisterData,
        salt: &Salt,
        admin_emails: impl AsRef<[String]>,
    ) -> Result<User, Problem> {
        register.validate()?;

        let mut user = User::new(&register.email, &register.password, salt);

        if self.find_user_by_email(&user.email).await?.is_some() {
            return Err(problem::bad_email(
                user.email.clone(),
                "Email already registered.",
            ));
        }

        if let Some(role) = register.role {
            user.role = role;
        }
        if admin_emails.as_ref().contains(&user.email) {
            user.role = Role::Admin;
        }

        self.collection::<User>(USER_COLLECTION_NAME)
            .insert_one(&user, None)
            .await
            .map_err(Problem::from)?;

        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one(doc! { "email": email.as_ref().trim().to_lowercase() }, None)
            .await
            .map_err(Problem::from)
    }

    async fn count_users(&self) -> Result<u64, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .count_documents(None, None)
            .await
            .map_err(Problem::from)
    }

    async fn login_user(&self, login: &LoginData, salt: &Salt) -> Result<User, Problem> {
        login.validate()?;

        let user = self
            .find_user_by_email(&login.email)
            .await?
            .ok_or_else(problem::bad_login)?;

        if user.pw_hash != PasswordHash::new(&login.password, salt) {
            return Err(problem::bad_login());
        }

        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }
}
