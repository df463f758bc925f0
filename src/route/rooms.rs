use chrono::{NaiveDate, Utc};
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::error_log::ErrorLogDbExt;
use crate::data::room::{Room, RoomData, RoomDbExt, RoomView};
use crate::data::store::Store;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

fn parse_as_of(raw: Option<&str>) -> Result<NaiveDate, Problem> {
    match raw {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            problems::validation(
                "Bad reference date.",
                "The 'as_of' parameter must be formatted as YYYY-MM-DD.",
            )
        }),
        None => Ok(Utc::now().date_naive()),
    }
}

/// List rooms enriched with their residents at `as_of` (default today).
/// Occupancy is derived by counting active dormitory records.
#[utoipa::path(
    responses(
        (status = 200, description = "Rooms with derived occupancy"),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/rooms?<as_of>")]
#[tracing::instrument(skip(db))]
pub async fn room_list(
    as_of: Option<&str>,
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Vec<RoomView>>, Problem> {
    let as_of = parse_as_of(as_of)?;
    Ok(Json(db.rooms_with_occupants(as_of).await?))
}

/// Create a room.
#[utoipa::path(
    request_body = RoomData,
    responses(
        (status = 200, description = "Created room", body = Room),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 409, description = "Room name already used", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/rooms", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(db))]
pub async fn room_create(
    data: Json<RoomData>,
    auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Room>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can manage rooms."));
    }

    match db.create_room(data.0).await {
        Ok(room) => Ok(Json(room)),
        Err(problem) => {
            db.log_if_internal("CREATE_ROOM_ERROR", &problem).await;
            Err(problem)
        }
    }
}

/// Replace a room's name, capacity, and note.
#[utoipa::path(
    request_body = RoomData,
    params(("id", description = "room ID")),
    responses(
        (status = 200, description = "Updated room", body = Room),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "Queried room doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/rooms/<id>", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(db))]
pub async fn room_update(
    id: Uuid,
    data: Json<RoomData>,
    auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Room>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can manage rooms."));
    }

    match db.update_room(id, data.0).await {
        Ok(Some(room)) => Ok(Json(room)),
        Ok(None) => Err(problems::not_found("Room", id)),
        Err(problem) => {
            db.log_if_internal("UPDATE_ROOM_ERROR", &problem).await;
            Err(problem)
        }
    }
}

/// Delete a room; refuses while dormitory records reference it.
#[utoipa::path(
    params(("id", description = "room ID")),
    responses(
        (status = 200, description = "The removed room", body = Room),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "Queried room doesn't exist", body = Problem),
        (status = 409, description = "Dormitory records still reference the room", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/rooms/<id>")]
#[tracing::instrument(skip(db))]
pub async fn room_delete(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Room>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can manage rooms."));
    }

    match db.delete_room(id).await {
        Ok(Some(room)) => Ok(Json(room)),
        Ok(None) => Err(problems::not_found("Room", id)),
        Err(problem) => {
            db.log_if_internal("DELETE_ROOM_ERROR", &problem).await;
            Err(problem)
        }
    }
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod room_endpoints {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use uuid::Uuid;

    use crate::data::department::{DepartmentData, DepartmentDbExt};
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

    fn cookie_for(role: Role, security: &Security) -> rocket::http::Cookie<'static> {
        let mut user = User::new("staff@college.example", "staff_pass_123", &security.salt);
        user.role = role;
        UserRoleToken::new(&user)
            .cookie(&security.jwt_keys.private)
            .expect("unable to encode cookie")
    }

    fn student_body(department: Uuid, room: Uuid, last_name: &str) -> serde_json::Value {
        json!({
            "last_name": last_name,
            "first_name": "Test",
            "birth_date": "2005-01-15",
            "phone": "+7 (999)-123-45-67",
            "funding": "budget",
            "education": "nine_grades",
            "department": department,
            "group": "CS-21-1",
            "admission_year": 2021,
            "dormitory": {
                "room_id": room,
                "check_in": "2024-02-01"
            }
        })
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_room_mutation_requires_admin() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();

        let response = client
            .post("/api/v1/rooms")
            .header(ContentType::JSON)
            .cookie(cookie_for(Role::Employee, security))
            .body(r#"{"name":"901","capacity":2}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB"]
    async fn v1_full_room_rejects_another_resident() {
        let client = client().await;
        let security: &Security = client.rocket().state().unwrap();
        let db: &Store = client.rocket().state().unwrap();

        let department = db
            .create_department(DepartmentData {
                name: format!("Test department {}", Uuid::new_v4()),
                code: "TR".to_string(),
            })
            .await
            .expect("unable to create test department");
        let room = db
            .create_room(RoomData {
                name: format!("test-{}", Uuid::new_v4()),
                capacity: 1,
                note: None,
            })
            .await
            .expect("unable to create test room");

        let admin = cookie_for(Role::Admin, security);

        let response = client
            .post("/api/v1/students")
            .header(ContentType::JSON)
            .cookie(admin.clone())
            .body(student_body(department.id, room.id, "Resident").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "first resident fits");
        let first: serde_json::Value = response.into_json().await.expect("invalid json");
        let first_id: Uuid =
            serde_json::from_value(first["student"]["_id"].clone()).expect("student id");

        let response = client
            .post("/api/v1/students")
            .header(ContentType::JSON)
            .cookie(admin.clone())
            .body(student_body(department.id, room.id, "Overflow").to_string())
            .dispatch()
            .await;
        assert_eq!(
            response.status(),
            Status::Conflict,
            "assignment beyond capacity must be rejected"
        );

        // The room reads as occupied in the listing.
        let response = client
            .get("/api/v1/rooms?as_of=2024-06-01")
            .cookie(admin)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let rooms: serde_json::Value = response.into_json().await.expect("invalid json");
        let listed = rooms
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["_id"] == json!(room.id))
            .expect("room is listed");
        assert_eq!(listed["occupancy"], json!(1));
        assert_eq!(listed["available"], json!(false));

        db.delete_student(first_id)
            .await
            .expect("unable to delete test student");
        db.delete_room(room.id).await.expect("unable to delete room");
        db.delete_department(department.id)
            .await
            .expect("unable to delete test department");
    }
}
