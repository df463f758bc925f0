use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::error_log::ErrorLogDbExt;
use crate::data::store::Store;
use crate::data::student::db::{StudentDbExt, StudentDetail};
use crate::data::student::query::StudentQuery;
use crate::data::student::{Student, StudentPayload};
use crate::middleware::paging::PageState;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;

/// List students, paged via `page`/`len`.
#[utoipa::path(
    responses(
        (status = 200, description = "Page of student records", body = Vec<Student>),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/students")]
#[tracing::instrument(skip(db))]
pub async fn student_list(
    page: PageState,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Vec<Student>>, Problem> {
    Ok(Json(db.list_students(page).await?))
}

/// Evaluate the combined status/scalar filter.
///
/// Per-kind parameters (`orphan`, `disability`, `special_needs`, `wartime`,
/// `scholarship`, `risk_group`, `register`, `dormitory`) accept `true`
/// (active at `as_of`), `all`, or `expired`; supplying several intersects
/// their results.
#[utoipa::path(
    params(StudentQuery),
    responses(
        (status = 200, description = "Matching students joined with their status records"),
        (status = 400, description = "Malformed filter parameter", body = Problem),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/students/filter?<query..>")]
#[tracing::instrument(skip(db))]
pub async fn student_filter(
    query: StudentQuery,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Vec<StudentDetail>>, Problem> {
    Ok(Json(db.filter_students(&query).await?))
}

/// Get one student with every status record and attachment.
#[utoipa::path(
    params(("id", description = "student ID")),
    responses(
        (status = 200, description = "Student joined with status records"),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 404, description = "Queried student doesn't exist"),
    ),
    security(("jwt" = []))
)]
#[get("/students/<id>")]
#[tracing::instrument(skip(db))]
pub async fn student_get(
    id: Uuid,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Option<Json<StudentDetail>>, Problem> {
    Ok(db.student_detail(id).await?.map(Json))
}

/// Create a student together with any populated status sections.
#[utoipa::path(
    request_body = StudentPayload,
    responses(
        (status = 200, description = "Created student joined with status records"),
        (status = 400, description = "Validation failure", body = Problem),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 409, description = "Assigned room is already full", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/students", format = "application/json", data = "<payload>")]
#[tracing::instrument(skip(db))]
pub async fn student_create(
    payload: Json<StudentPayload>,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<StudentDetail>, Problem> {
    match db.create_student(&payload.0).await {
        Ok(detail) => Ok(Json(detail)),
        Err(problem) => {
            db.log_if_internal("CREATE_STUDENT_ERROR", &problem).await;
            Err(problem)
        }
    }
}

/// Overwrite a student and re-save its status sections.
#[utoipa::path(
    request_body = StudentPayload,
    params(("id", description = "student ID")),
    responses(
        (status = 200, description = "Updated student joined with status records"),
        (status = 400, description = "Validation failure", body = Problem),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 404, description = "Queried student doesn't exist", body = Problem),
        (status = 409, description = "Assigned room is already full", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/students/<id>", format = "application/json", data = "<payload>")]
#[tracing::instrument(skip(db))]
pub async fn student_update(
    id: Uuid,
    payload: Json<StudentPayload>,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<StudentDetail>, Problem> {
    match db.update_student(id, &payload.0).await {
        Ok(detail) => Ok(Json(detail)),
        Err(problem) => {
            db.log_if_internal("UPDATE_STUDENT_ERROR", &problem).await;
            Err(problem)
        }
    }
}

/// Cascade-delete a student and all of their status records.
#[utoipa::path(
    params(("id", description = "student ID")),
    responses(
        (status = 200, description = "The removed student", body = Student),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 404, description = "Queried student doesn't exist", body = Problem),
        (status = 409, description = "Attached files block the deletion", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/students/<id>")]
#[tracing::instrument(skip(db))]
pub async fn student_delete(
    id: Uuid,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Student>, Problem> {
    match db.delete_student(id).await {
        Ok(student) => Ok(Json(student)),
        Err(problem) => {
            db.log_if_internal("DELETE_STUDENT_ERROR", &problem).await;
            Err(problem)
        }
    }
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod student_endpoints {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use uuid::Uuid;

    use crate::data::department::{DepartmentData, DepartmentDbExt};
    use crate::data::file::{FileDbExt, FileRecord, Owner};
    use crate::data::room::{RoomData, RoomDbExt};
    use crate::data::store::Store;
    use crate::data::student::db::StudentDbExt;
    use crate::data::user::User;
    use crate::resp::jwt::UserRoleToken;
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

    fn student_body(department: Uuid) -> serde_json::Value {
        json!({
            "last_name": "Ivanov",
            "first_name": "Ivan",
            "birth_date": "2005-01-15",
            "phone": "+7 (999)-123-45-67",
            "funding": "budget",
            "education": "nine_grades",
            "department": department,
            "group": "CS-21-1",
            "admission_year": 2021,
            "graduation_year": 2025,
            "orphan": {
                "decree": "No. 117-c",
                "start_date": "2024-01-01",
                "note": "guardianship arranged"
            }
        })
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_student_list_requires_auth() {
        let client = client().await;

        let response = client.get("/api/v1/students").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_student_create_round_trips() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();
        let db: &Store = client.rocket().state().unwrap();

        let department = db
            .create_department(DepartmentData {
                name: format!("Test department {}", Uuid::new_v4()),
                code: "TD".to_string(),
            })
            .await
            .expect("unable to create test department");

        let response = client
            .post("/api/v1/students")
            .header(ContentType::JSON)
            .cookie(admin_cookie(security))
            .body(student_body(department.id).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");

        let created: serde_json::Value = response.into_json().await.expect("invalid json");
        let id: Uuid = serde_json::from_value(created["student"]["_id"].clone())
            .expect("created student has an id");

        let fetch_uri = format!("/api/v1/students/{}", id);
        let response = client
            .get(&fetch_uri)
            .cookie(admin_cookie(security))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");

        let fetched: serde_json::Value = response.into_json().await.expect("invalid json");
        assert_eq!(fetched["student"]["last_name"], "Ivanov");
        assert_eq!(fetched["student"]["phone"], "+7 (999)-123-45-67");
        assert_eq!(fetched["orphan"]["record"]["decree"], "No. 117-c");
        assert_eq!(fetched["orphan"]["record"]["start_date"], "2024-01-01");
        assert_eq!(fetched["orphan"]["record"]["end_date"], serde_json::Value::Null);

        let response = client
            .delete(&fetch_uri)
            .cookie(admin_cookie(security))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");

        db.delete_department(department.id)
            .await
            .expect("unable to delete test department");
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_student_delete_blocked_by_attached_files() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();
        let db: &Store = client.rocket().state().unwrap();

        let department = db
            .create_department(DepartmentData {
                name: format!("Test department {}", Uuid::new_v4()),
                code: "TF".to_string(),
            })
            .await
            .expect("unable to create test department");
        let room = db
            .create_room(RoomData {
                name: format!("test-{}", Uuid::new_v4()),
                capacity: 2,
                note: None,
            })
            .await
            .expect("unable to create test room");

        let mut body = student_body(department.id);
        body["dormitory"] = json!({
            "room_id": room.id,
            "check_in": "2024-02-01"
        });

        let response = client
            .post("/api/v1/students")
            .header(ContentType::JSON)
            .cookie(admin_cookie(security))
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");

        let created: serde_json::Value = response.into_json().await.expect("invalid json");
        let student_id: Uuid =
            serde_json::from_value(created["student"]["_id"].clone()).expect("student id");
        let dormitory_id: Uuid =
            serde_json::from_value(created["dormitory"]["record"]["_id"].clone())
                .expect("dormitory record id");

        // Attach a document to the dormitory record.
        let file = FileRecord::new(
            Owner::new(crate::data::file::EntityKind::Dormitory, dormitory_id),
            "/uploads/contract.pdf",
        );
        db.insert_file(&file).await.expect("unable to insert file");

        let delete_uri = format!("/api/v1/students/{}", student_id);
        let response = client
            .delete(&delete_uri)
            .cookie(admin_cookie(security))
            .dispatch()
            .await;
        assert_eq!(
            response.status(),
            Status::Conflict,
            "delete must be blocked while files are attached"
        );

        // Remove the file; the cascade must now go through.
        db.delete_file(file.id).await.expect("unable to delete file");

        let response = client
            .delete(&delete_uri)
            .cookie(admin_cookie(security))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");
        assert!(db
            .student_detail(student_id)
            .await
            .expect("detail query works")
            .is_none());

        db.delete_room(room.id).await.expect("unable to delete room");
        db.delete_department(department.id)
            .await
            .expect("unable to delete test department");
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_filter_intersects_orphan_and_disability() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();
        let db: &Store = client.rocket().state().unwrap();

        let department = db
            .create_department(DepartmentData {
                name: format!("Test department {}", Uuid::new_v4()),
                code: "TI".to_string(),
            })
            .await
            .expect("unable to create test department");

        // Active orphan status, disability that lapsed in 2023.
        let marker = format!("Filterov-{}", Uuid::new_v4().simple());
        let mut body = student_body(department.id);
        body["last_name"] = json!(marker);
        body["disability"] = json!({
            "decree": "No. 5",
            "disability_type": "II",
            "start_date": "2023-01-01",
            "end_date": "2023-06-01"
        });

        let response = client
            .post("/api/v1/students")
            .header(ContentType::JSON)
            .cookie(admin_cookie(security))
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "an ok response");
        let created: serde_json::Value = response.into_json().await.expect("invalid json");
        let student_id: Uuid =
            serde_json::from_value(created["student"]["_id"].clone()).expect("student id");

        let both_active = format!(
            "/api/v1/students/filter?last_name={}&orphan=true&disability=true&as_of=2024-06-01",
            marker
        );
        let response = client
            .get(&both_active)
            .cookie(admin_cookie(security))
            .dispatch()
            .await;
        let matches: serde_json::Value = response.into_json().await.expect("invalid json");
        assert_eq!(matches.as_array().map(Vec::len), Some(0));

        let orphan_and_lapsed = format!(
            "/api/v1/students/filter?last_name={}&orphan=true&disability=expired&as_of=2024-06-01",
            marker
        );
        let response = client
            .get(&orphan_and_lapsed)
            .cookie(admin_cookie(security))
            .dispatch()
            .await;
        let matches: serde_json::Value = response.into_json().await.expect("invalid json");
        assert_eq!(matches.as_array().map(Vec::len), Some(1));

        db.delete_student(student_id)
            .await
            .expect("unable to delete test student");
        db.delete_department(department.id)
            .await
            .expect("unable to delete test department");
    }
}
