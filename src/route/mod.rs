use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod app;
pub mod departments;
pub mod files;
pub mod rooms;
pub mod students;
pub mod users;

use departments::*;
use files::*;
use rooms::*;
use students::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        department::{Department, DepartmentData},
        file::{EntityKind, FileRecord, Owner},
        room::{Room, RoomData},
        status as st,
        student::{Education, Funding, Gender, Student, StudentPayload},
        user::db::{LoginData, RegisterData},
        user::UserResponse,
    },
    resp::{jwt::doc::JWTAuth, problem::Problem},
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        student_list,
        student_filter,
        student_get,
        student_create,
        student_update,
        student_delete,
        department_list,
        department_create,
        department_update,
        department_delete,
        room_list,
        room_create,
        room_update,
        room_delete,
        upload_file,
        file_list,
        file_delete,
        login_submit,
        register_submit,
        whoami,
        user_delete
    ),
    components(schemas(
        Role,
        Problem,
        Student,
        StudentPayload,
        Funding,
        Education,
        Gender,
        st::OrphanStatus,
        st::DisabilityStatus,
        st::SpecialNeedsStatus,
        st::WartimeStatus,
        st::ScholarshipStatus,
        st::RiskRegistryStatus,
        st::RiskKind,
        st::CommitteeMeeting,
        st::DormitoryStatus,
        st::DecreePayload,
        st::DisabilityPayload,
        st::ServicePayload,
        st::RiskRegistryPayload,
        st::CommitteeMeetingPayload,
        st::DormitoryPayload,
        st::FileRef,
        Department,
        DepartmentData,
        Room,
        RoomData,
        FileRecord,
        Owner,
        EntityKind,
        UploadResponse,
        UserResponse,
        LoginData,
        RegisterData
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_v1() -> Vec<Route> {
    routes![
        student_list,
        student_filter,
        student_get,
        student_create,
        student_update,
        student_delete,
        department_list,
        department_create,
        department_update,
        department_delete,
        room_list,
        room_create,
        room_update,
        room_delete,
        upload_file,
        file_list,
        file_delete,
        login_submit,
        register_submit,
        whoami,
        user_delete
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
        )
        .mount("/", routes![app::app, app::app_path])
}
