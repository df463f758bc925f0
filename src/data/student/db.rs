use std::collections::HashSet;

use bson::{doc, Document};
use chrono::NaiveDate;
use mongodb::options::FindOptions;
use mongodb::ClientSession;
use rocket::futures::StreamExt;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::query::{intersect, matching_ids, StatusFilter, StudentQuery};
use super::{Student, StudentPayload, STUDENT_COLLECTION_NAME};
use crate::data::department::DepartmentDbExt;
use crate::data::file::{EntityKind, FileDbExt, FileRecord, Owner};
use crate::data::filter;
use crate::data::room::{Room, RoomDbExt};
use crate::data::status::db::{StatusDbExt, StudentStatuses};
use crate::data::status::{
    DisabilityStatus, DormitoryStatus, OrphanStatus, OwnedRecord, RiskRegistryStatus,
    ScholarshipStatus, SpecialNeedsStatus, Temporal, WartimeStatus, COMMITTEE_COLLECTION_NAME,
    DISABILITY_COLLECTION_NAME, DORMITORY_COLLECTION_NAME, ORPHAN_COLLECTION_NAME,
    RISK_REGISTRY_COLLECTION_NAME, SCHOLARSHIP_COLLECTION_NAME, SPECIAL_NEEDS_COLLECTION_NAME,
    WARTIME_COLLECTION_NAME,
};
use crate::data::store::Store;
use crate::middleware::paging::PageState;
use crate::resp::problem::Problem;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Student doesn't exist.")
            .insert_str("id", id)
            .to_owned()
    }

    #[inline]
    pub fn unknown_department(id: Uuid) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Unknown department.")
            .insert_str("department", id)
            .to_owned()
    }
}

/// A status record together with its attached documents.
#[derive(Debug, Clone, Serialize)]
pub struct Attached<T> {
    pub record: T,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DormitoryDetail {
    pub record: DormitoryStatus,
    pub room: Option<Room>,
    pub files: Vec<FileRecord>,
}

/// A student joined with every status record and attachment.
#[derive(Debug, Clone, Serialize)]
pub struct StudentDetail {
    pub student: Student,
    pub files: Vec<FileRecord>,
    pub orphan: Option<Attached<OrphanStatus>>,
    pub disability: Option<Attached<DisabilityStatus>>,
    pub special_needs: Option<Attached<SpecialNeedsStatus>>,
    pub wartime: Option<Attached<WartimeStatus>>,
    pub scholarship: Option<Attached<ScholarshipStatus>>,
    pub risk_registry: Option<Attached<RiskRegistryStatus>>,
    pub committee: Vec<crate::data::status::CommitteeMeeting>,
    pub dormitory: Option<DormitoryDetail>,
}

pub trait StudentDbExt {
    async fn list_students(&self, page: PageState) -> Result<Vec<Student>, Problem>;
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>, Problem>;
    async fn student_detail(&self, id: Uuid) -> Result<Option<StudentDetail>, Problem>;

    /// Creates the student and every populated status section in one
    /// transaction; nothing is persisted when any section is rejected.
    async fn create_student(&self, payload: &StudentPayload) -> Result<StudentDetail, Problem>;

    /// Overwrites the student and re-saves its status sections
    /// transactionally. Omitted sections are left untouched.
    async fn update_student(
        &self,
        id: Uuid,
        payload: &StudentPayload,
    ) -> Result<StudentDetail, Problem>;

    /// Cascade-deletes the student and all status records, refusing while
    /// any of them still owns attached files.
    async fn delete_student(&self, id: Uuid) -> Result<Student, Problem>;

    /// Intersects per-kind status-id sets, then applies scalar predicates
    /// to the surviving students.
    async fn filter_students(&self, query: &StudentQuery) -> Result<Vec<StudentDetail>, Problem>;
}

impl Store {
    async fn kind_id_set<T>(
        &self,
        collection: &str,
        extra: Option<Document>,
        status_filter: StatusFilter,
        as_of: NaiveDate,
    ) -> Result<HashSet<Uuid>, Problem>
    where
        T: DeserializeOwned + Temporal + OwnedRecord + Unpin + Send + Sync,
    {
        let mut cursor = self
            .collection::<T>(collection)
            .find(extra, None)
            .await
            .map_err(Problem::from)?;

        let mut records = vec![];
        while let Some(record) = cursor.next().await {
            records.push(record.map_err(Problem::from)?);
        }

        Ok(matching_ids(&records, status_filter, as_of))
    }

    async fn committee_attendee_ids(&self) -> Result<HashSet<Uuid>, Problem> {
        let values = self
            .collection::<Document>(COMMITTEE_COLLECTION_NAME)
            .distinct("student_id", None, None)
            .await
            .map_err(Problem::from)?;

        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                bson::Bson::String(raw) => Uuid::parse_str(&raw).ok(),
                _ => None,
            })
            .collect())
    }

    async fn room_resident_ids(
        &self,
        room_name: &str,
        as_of: NaiveDate,
    ) -> Result<HashSet<Uuid>, Problem> {
        let rooms = self.find_rooms_by_name(room_name).await?;

        let mut residents = HashSet::new();
        for room in rooms {
            let ids = self
                .kind_id_set::<DormitoryStatus>(
                    DORMITORY_COLLECTION_NAME,
                    Some(filter::by_room(room.id)),
                    StatusFilter::Active,
                    as_of,
                )
                .await?;
            residents.extend(ids);
        }

        Ok(residents)
    }

    async fn assemble_detail(&self, student: Student) -> Result<StudentDetail, Problem> {
        let statuses: StudentStatuses = self.fetch_statuses(student.id).await?;
        let files = self
            .files_for(Owner::new(EntityKind::Student, student.id))
            .await?;

        macro_rules! attach {
            ($record:expr, $kind:expr) => {
                match $record {
                    Some(record) => Some(Attached {
                        files: self.files_for(Owner::new($kind, record.id)).await?,
                        record,
                    }),
                    None => None,
                }
            };
        }

        let orphan = attach!(statuses.orphan, EntityKind::Orphan);
        let disability = attach!(statuses.disability, EntityKind::Disability);
        let special_needs = attach!(statuses.special_needs, EntityKind::SpecialNeeds);
        let wartime = attach!(statuses.wartime, EntityKind::Wartime);
        let scholarship = attach!(statuses.scholarship, EntityKind::Scholarship);
        let risk_registry = attach!(statuses.risk_registry, EntityKind::RiskRegistry);

        let dormitory = match statuses.dormitory {
            Some(record) => {
                let room = self.get_room(record.room_id).await?;
                let files = self
                    .files_for(Owner::new(EntityKind::Dormitory, record.id))
                    .await?;
                Some(DormitoryDetail {
                    record,
                    room,
                    files,
                })
            }
            None => None,
        };

        Ok(StudentDetail {
            student,
            files,
            orphan,
            disability,
            special_needs,
            wartime,
            scholarship,
            risk_registry,
            committee: statuses.committee,
            dormitory,
        })
    }

    async fn save_bundle(
        &self,
        student: &Student,
        payload: &StudentPayload,
        insert: bool,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        let students = self.collection::<Student>(STUDENT_COLLECTION_NAME);
        if insert {
            students
                .insert_one_with_session(student, None, session)
                .await
                .map_err(Problem::from)?;
        } else {
            students
                .replace_one_with_session(filter::by_id(student.id), student, None, session)
                .await
                .map_err(Problem::from)?;
        }

        if let Some(section) = &payload.orphan {
            self.save_orphan(student.id, section, session).await?;
        }
        if let Some(section) = &payload.disability {
            self.save_disability(student.id, section, session).await?;
        }
        if let Some(section) = &payload.special_needs {
            self.save_special_needs(student.id, section, session).await?;
        }
        if let Some(section) = &payload.wartime {
            self.save_wartime(student.id, section, session).await?;
        }
        if let Some(section) = &payload.scholarship {
            self.save_scholarship(student.id, section, session).await?;
        }
        if let Some(section) = &payload.risk_registry {
            self.save_risk_registry(student.id, section, session).await?;
        }
        if let Some(meetings) = &payload.committee {
            self.save_committee(student.id, meetings, session).await?;
        }
        if let Some(section) = &payload.dormitory {
            self.save_dormitory(student.id, section, session).await?;
        }

        Ok(())
    }

    async fn save_in_transaction(
        &self,
        student: &Student,
        payload: &StudentPayload,
        insert: bool,
    ) -> Result<(), Problem> {
        let mut session = self.start_transaction().await?;

        match self.save_bundle(student, payload, insert, &mut session).await {
            Ok(()) => session
                .commit_transaction()
                .await
                .map_err(Problem::from),
            Err(problem) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!("unable to abort student save transaction: {}", abort);
                }
                Err(problem)
            }
        }
    }
}

impl StudentDbExt for Store {
    async fn list_students(&self, page: PageState) -> Result<Vec<Student>, Problem> {
        let options = FindOptions::builder()
            .sort(doc! { "last_name": 1, "first_name": 1 })
            .skip((page.page as u64) * (page.page_length as u64))
            .limit(page.page_length as i64)
            .build();

        let mut cursor = self
            .collection::<Student>(STUDENT_COLLECTION_NAME)
            .find(None, options)
            .await
            .map_err(Problem::from)?;

        let mut students = vec![];
        while let Some(student) = cursor.next().await {
            match student {
                Ok(it) => students.push(it),
                Err(_) => tracing::warn!("Unable to deserialize student document."),
            }
        }

        Ok(students)
    }

    async fn get_student(&self, id: Uuid) -> Result<Option<Student>, Problem> {
        self.collection::<Student>(STUDENT_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn student_detail(&self, id: Uuid) -> Result<Option<StudentDetail>, Problem> {
        match self.get_student(id).await? {
            Some(student) => Ok(Some(self.assemble_detail(student).await?)),
            None => Ok(None),
        }
    }

    async fn create_student(&self, payload: &StudentPayload) -> Result<StudentDetail, Problem> {
        let student = payload.into_student(Uuid::new_v4())?;

        if self.get_department(student.department).await?.is_none() {
            return Err(problem::unknown_department(student.department));
        }

        self.save_in_transaction(&student, payload, true).await?;

        self.student_detail(student.id)
            .await?
            .ok_or_else(|| problem::not_found(student.id))
    }

    async fn update_student(
        &self,
        id: Uuid,
        payload: &StudentPayload,
    ) -> Result<StudentDetail, Problem> {
        if self.get_student(id).await?.is_none() {
            return Err(problem::not_found(id));
        }

        let student = payload.into_student(id)?;
        if self.get_department(student.department).await?.is_none() {
            return Err(problem::unknown_department(student.department));
        }

        self.save_in_transaction(&student, payload, false).await?;

        self.student_detail(id)
            .await?
            .ok_or_else(|| problem::not_found(id))
    }

    async fn delete_student(&self, id: Uuid) -> Result<Student, Problem> {
        let student = self
            .get_student(id)
            .await?
            .ok_or_else(|| problem::not_found(id))?;

        self.assert_student_unreferenced(id).await?;

        let mut session = self.start_transaction().await?;
        let result: Result<(), Problem> = async {
            self.delete_statuses(id, &mut session).await?;
            self.collection::<Student>(STUDENT_COLLECTION_NAME)
                .delete_one_with_session(filter::by_id(id), None, &mut session)
                .await
                .map_err(Problem::from)?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                session.commit_transaction().await.map_err(Problem::from)?;
                Ok(student)
            }
            Err(problem) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!("unable to abort student delete transaction: {}", abort);
                }
                Err(problem)
            }
        }
    }

    async fn filter_students(&self, query: &StudentQuery) -> Result<Vec<StudentDetail>, Problem> {
        let as_of = query.reference_date()?;

        let mut sets: Vec<HashSet<Uuid>> = vec![];
        if let Some(f) = query.orphan {
            sets.push(
                self.kind_id_set::<OrphanStatus>(ORPHAN_COLLECTION_NAME, None, f, as_of)
                    .await?,
            );
        }
        if let Some(f) = query.disability {
            sets.push(
                self.kind_id_set::<DisabilityStatus>(DISABILITY_COLLECTION_NAME, None, f, as_of)
                    .await?,
            );
        }
        if let Some(f) = query.special_needs {
            sets.push(
                self.kind_id_set::<SpecialNeedsStatus>(
                    SPECIAL_NEEDS_COLLECTION_NAME,
                    None,
                    f,
                    as_of,
                )
                .await?,
            );
        }
        if let Some(f) = query.wartime {
            sets.push(
                self.kind_id_set::<WartimeStatus>(WARTIME_COLLECTION_NAME, None, f, as_of)
                    .await?,
            );
        }
        if let Some(f) = query.scholarship {
            sets.push(
                self.kind_id_set::<ScholarshipStatus>(SCHOLARSHIP_COLLECTION_NAME, None, f, as_of)
                    .await?,
            );
        }
        if let Some(f) = query.risk_group {
            sets.push(
                self.kind_id_set::<RiskRegistryStatus>(
                    RISK_REGISTRY_COLLECTION_NAME,
                    Some(doc! { "kind": "risk_group" }),
                    f,
                    as_of,
                )
                .await?,
            );
        }
        if let Some(f) = query.register {
            sets.push(
                self.kind_id_set::<RiskRegistryStatus>(
                    RISK_REGISTRY_COLLECTION_NAME,
                    Some(doc! { "kind": "register" }),
                    f,
                    as_of,
                )
                .await?,
            );
        }
        if let Some(f) = query.dormitory {
            sets.push(
                self.kind_id_set::<DormitoryStatus>(DORMITORY_COLLECTION_NAME, None, f, as_of)
                    .await?,
            );
        }
        if query.committee == Some(true) {
            sets.push(self.committee_attendee_ids().await?);
        }
        if let Some(room_name) = &query.room {
            sets.push(self.room_resident_ids(room_name, as_of).await?);
        }

        let candidates = intersect(sets);

        let selector = match &candidates {
            Some(ids) if ids.is_empty() => return Ok(vec![]),
            Some(ids) => Some(doc! { "_id": filter::uuid_in(ids.iter().copied()) }),
            None => None,
        };

        let mut cursor = self
            .collection::<Student>(STUDENT_COLLECTION_NAME)
            .find(selector, None)
            .await
            .map_err(Problem::from)?;

        let mut students = vec![];
        while let Some(student) = cursor.next().await {
            let student = student.map_err(Problem::from)?;
            if query.matches_student(&student, as_of) {
                students.push(student);
            }
        }

        let mut details = vec![];
        for student in students {
            details.push(self.assemble_detail(student).await?);
        }

        Ok(details)
    }
}
