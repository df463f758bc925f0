use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::department::{Department, DepartmentData, DepartmentDbExt};
use crate::data::error_log::ErrorLogDbExt;
use crate::data::store::Store;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

/// List departments.
#[utoipa::path(
    responses(
        (status = 200, description = "All departments", body = Vec<Department>),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/departments")]
#[tracing::instrument(skip(db))]
pub async fn department_list(
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Vec<Department>>, Problem> {
    Ok(Json(db.list_departments().await?))
}

/// Create a department.
#[utoipa::path(
    request_body = DepartmentData,
    responses(
        (status = 200, description = "Created department", body = Department),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 409, description = "Name or code already used", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/departments", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(db))]
pub async fn department_create(
    data: Json<DepartmentData>,
    auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Department>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can manage departments."));
    }

    match db.create_department(data.0).await {
        Ok(department) => Ok(Json(department)),
        Err(problem) => {
            db.log_if_internal("CREATE_DEPARTMENT_ERROR", &problem).await;
            Err(problem)
        }
    }
}

/// Replace a department's name and code.
#[utoipa::path(
    request_body = DepartmentData,
    params(("id", description = "department ID")),
    responses(
        (status = 200, description = "Updated department", body = Department),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "Queried department doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/departments/<id>", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(db))]
pub async fn department_update(
    id: Uuid,
    data: Json<DepartmentData>,
    auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Department>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can manage departments."));
    }

    match db.update_department(id, data.0).await {
        Ok(Some(department)) => Ok(Json(department)),
        Ok(None) => Err(problems::not_found("Department", id)),
        Err(problem) => {
            db.log_if_internal("UPDATE_DEPARTMENT_ERROR", &problem).await;
            Err(problem)
        }
    }
}

/// Delete a department; refuses while students reference it.
#[utoipa::path(
    params(("id", description = "department ID")),
    responses(
        (status = 200, description = "The removed department", body = Department),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "Queried department doesn't exist", body = Problem),
        (status = 409, description = "Students still reference the department", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/departments/<id>")]
#[tracing::instrument(skip(db))]
pub async fn department_delete(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Department>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can manage departments."));
    }

    match db.delete_department(id).await {
        Ok(Some(department)) => Ok(Json(department)),
        Ok(None) => Err(problems::not_found("Department", id)),
        Err(problem) => {
            db.log_if_internal("DELETE_DEPARTMENT_ERROR", &problem).await;
            Err(problem)
        }
    }
}
