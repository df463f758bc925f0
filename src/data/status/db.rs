//! Persistence for status records: find-by-student upsert, payload-driven
//! clearing, and the cascade checks used by student deletion.

use bson::Document;
use mongodb::options::ReplaceOptions;
use mongodb::ClientSession;
use rocket::futures::StreamExt;
use serde::Serialize;
use uuid::Uuid;

use super::*;
use crate::data::file::{EntityKind, FileDbExt, Owner};
use crate::data::filter;
use crate::data::room::RoomDbExt;
use crate::data::store::Store;
use crate::resp::problem::{problems, Problem};

/// Every status record held by one student.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentStatuses {
    pub orphan: Option<OrphanStatus>,
    pub disability: Option<DisabilityStatus>,
    pub special_needs: Option<SpecialNeedsStatus>,
    pub wartime: Option<WartimeStatus>,
    pub scholarship: Option<ScholarshipStatus>,
    pub risk_registry: Option<RiskRegistryStatus>,
    pub committee: Vec<CommitteeMeeting>,
    pub dormitory: Option<DormitoryStatus>,
}

pub trait StatusDbExt {
    async fn save_orphan(
        &self,
        student: Uuid,
        payload: &DecreePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_special_needs(
        &self,
        student: Uuid,
        payload: &DecreePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_disability(
        &self,
        student: Uuid,
        payload: &DisabilityPayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_wartime(
        &self,
        student: Uuid,
        payload: &ServicePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_scholarship(
        &self,
        student: Uuid,
        payload: &ServicePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_risk_registry(
        &self,
        student: Uuid,
        payload: &RiskRegistryPayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_committee(
        &self,
        student: Uuid,
        meetings: &[CommitteeMeetingPayload],
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
    async fn save_dormitory(
        &self,
        student: Uuid,
        payload: &DormitoryPayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;

    async fn fetch_statuses(&self, student: Uuid) -> Result<StudentStatuses, Problem>;

    /// Conflict while the student or any of their status records still owns
    /// attached files; deletion must not orphan retained documents.
    async fn assert_student_unreferenced(&self, student: Uuid) -> Result<(), Problem>;

    /// Removes every status record of every kind for the student.
    async fn delete_statuses(
        &self,
        student: Uuid,
        session: &mut ClientSession,
    ) -> Result<(), Problem>;
}

static STATUS_COLLECTIONS: &[(&str, EntityKind, &str)] = &[
    (ORPHAN_COLLECTION_NAME, EntityKind::Orphan, "Orphan status"),
    (
        DISABILITY_COLLECTION_NAME,
        EntityKind::Disability,
        "Disability status",
    ),
    (
        SPECIAL_NEEDS_COLLECTION_NAME,
        EntityKind::SpecialNeeds,
        "Special needs status",
    ),
    (
        WARTIME_COLLECTION_NAME,
        EntityKind::Wartime,
        "Wartime service status",
    ),
    (
        SCHOLARSHIP_COLLECTION_NAME,
        EntityKind::Scholarship,
        "Social scholarship",
    ),
    (
        RISK_REGISTRY_COLLECTION_NAME,
        EntityKind::RiskRegistry,
        "Risk registry status",
    ),
    (
        COMMITTEE_COLLECTION_NAME,
        EntityKind::Committee,
        "Committee meeting",
    ),
    (
        DORMITORY_COLLECTION_NAME,
        EntityKind::Dormitory,
        "Dormitory placement",
    ),
];

impl Store {
    async fn existing_record_id(
        &self,
        collection: &str,
        student: Uuid,
        session: &mut ClientSession,
    ) -> Result<Option<Uuid>, Problem> {
        let doc = self
            .collection::<Document>(collection)
            .find_one_with_session(filter::by_student(student), None, session)
            .await
            .map_err(Problem::from)?;

        Ok(doc.as_ref().and_then(|d| filter::doc_uuid(d, "_id")))
    }

    async fn upsert_record<T: Serialize + Send + Sync>(
        &self,
        collection: &str,
        student: Uuid,
        record: &T,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection::<T>(collection)
            .replace_one_with_session(filter::by_student(student), record, options, session)
            .await
            .map_err(Problem::from)?;
        Ok(())
    }

    async fn clear_record(
        &self,
        collection: &str,
        kind: EntityKind,
        label: &'static str,
        student: Uuid,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        if let Some(id) = self.existing_record_id(collection, student, session).await? {
            self.assert_no_files(Owner::new(kind, id), label).await?;
            self.collection::<Document>(collection)
                .delete_one_with_session(filter::by_student(student), None, session)
                .await
                .map_err(Problem::from)?;
        }
        Ok(())
    }

    async fn record_id_for_save(
        &self,
        collection: &str,
        student: Uuid,
        session: &mut ClientSession,
    ) -> Result<Uuid, Problem> {
        Ok(self
            .existing_record_id(collection, student, session)
            .await?
            .unwrap_or_else(Uuid::new_v4))
    }
}

impl StatusDbExt for Store {
    async fn save_orphan(
        &self,
        student: Uuid,
        payload: &DecreePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("orphan")? {
            SaveAction::Clear => {
                self.clear_record(
                    ORPHAN_COLLECTION_NAME,
                    EntityKind::Orphan,
                    "Orphan status",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let id = self
                    .record_id_for_save(ORPHAN_COLLECTION_NAME, student, session)
                    .await?;

                let record = OrphanStatus {
                    id,
                    student_id: student,
                    decree: require("orphan", "decree", payload.decree.clone())?,
                    start_date: require("orphan", "start_date", payload.start_date)?,
                    end_date: payload.end_date,
                    note: payload.note.clone(),
                };
                self.upsert_record(ORPHAN_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::Orphan, id))
                    .await
            }
        }
    }

    async fn save_special_needs(
        &self,
        student: Uuid,
        payload: &DecreePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("special needs")? {
            SaveAction::Clear => {
                self.clear_record(
                    SPECIAL_NEEDS_COLLECTION_NAME,
                    EntityKind::SpecialNeeds,
                    "Special needs status",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let id = self
                    .record_id_for_save(SPECIAL_NEEDS_COLLECTION_NAME, student, session)
                    .await?;

                let record = SpecialNeedsStatus {
                    id,
                    student_id: student,
                    decree: require("special needs", "decree", payload.decree.clone())?,
                    start_date: require("special needs", "start_date", payload.start_date)?,
                    end_date: payload.end_date,
                    note: payload.note.clone(),
                };
                self.upsert_record(SPECIAL_NEEDS_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::SpecialNeeds, id))
                    .await
            }
        }
    }

    async fn save_disability(
        &self,
        student: Uuid,
        payload: &DisabilityPayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("disability")? {
            SaveAction::Clear => {
                self.clear_record(
                    DISABILITY_COLLECTION_NAME,
                    EntityKind::Disability,
                    "Disability status",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let id = self
                    .record_id_for_save(DISABILITY_COLLECTION_NAME, student, session)
                    .await?;

                let record = DisabilityStatus {
                    id,
                    student_id: student,
                    decree: require("disability", "decree", payload.decree.clone())?,
                    disability_type: require(
                        "disability",
                        "disability_type",
                        payload.disability_type.clone(),
                    )?,
                    start_date: require("disability", "start_date", payload.start_date)?,
                    end_date: payload.end_date,
                    note: payload.note.clone(),
                };
                self.upsert_record(DISABILITY_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::Disability, id))
                    .await
            }
        }
    }

    async fn save_wartime(
        &self,
        student: Uuid,
        payload: &ServicePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("wartime service")? {
            SaveAction::Clear => {
                self.clear_record(
                    WARTIME_COLLECTION_NAME,
                    EntityKind::Wartime,
                    "Wartime service status",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let id = self
                    .record_id_for_save(WARTIME_COLLECTION_NAME, student, session)
                    .await?;

                let record = WartimeStatus {
                    id,
                    student_id: student,
                    start_date: require("wartime service", "start_date", payload.start_date)?,
                    end_date: payload.end_date,
                    note: payload.note.clone(),
                };
                self.upsert_record(WARTIME_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::Wartime, id))
                    .await
            }
        }
    }

    async fn save_scholarship(
        &self,
        student: Uuid,
        payload: &ServicePayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("social scholarship")? {
            SaveAction::Clear => {
                self.clear_record(
                    SCHOLARSHIP_COLLECTION_NAME,
                    EntityKind::Scholarship,
                    "Social scholarship",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let id = self
                    .record_id_for_save(SCHOLARSHIP_COLLECTION_NAME, student, session)
                    .await?;

                let record = ScholarshipStatus {
                    id,
                    student_id: student,
                    start_date: require("social scholarship", "start_date", payload.start_date)?,
                    end_date: payload.end_date,
                    note: payload.note.clone(),
                };
                self.upsert_record(SCHOLARSHIP_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::Scholarship, id))
                    .await
            }
        }
    }

    async fn save_risk_registry(
        &self,
        student: Uuid,
        payload: &RiskRegistryPayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("risk registry")? {
            SaveAction::Clear => {
                self.clear_record(
                    RISK_REGISTRY_COLLECTION_NAME,
                    EntityKind::RiskRegistry,
                    "Risk registry status",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let id = self
                    .record_id_for_save(RISK_REGISTRY_COLLECTION_NAME, student, session)
                    .await?;

                let record = RiskRegistryStatus {
                    id,
                    student_id: student,
                    kind: require("risk registry", "kind", payload.kind)?,
                    start_date: require("risk registry", "start_date", payload.start_date)?,
                    start_reason: require(
                        "risk registry",
                        "start_reason",
                        payload.start_reason.clone(),
                    )?,
                    start_basis: require(
                        "risk registry",
                        "start_basis",
                        payload.start_basis.clone(),
                    )?,
                    end_date: payload.end_date,
                    end_reason: payload.end_reason.clone(),
                    end_basis: payload.end_basis.clone(),
                    note: payload.note.clone(),
                };
                self.upsert_record(RISK_REGISTRY_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::RiskRegistry, id))
                    .await
            }
        }
    }

    async fn save_committee(
        &self,
        student: Uuid,
        meetings: &[CommitteeMeetingPayload],
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        let complete = complete_meetings(meetings)?;

        // The meeting list is saved wholesale: replace everything on file.
        self.collection::<CommitteeMeeting>(COMMITTEE_COLLECTION_NAME)
            .delete_many_with_session(filter::by_student(student), None, session)
            .await
            .map_err(Problem::from)?;

        for meeting in complete {
            let status = "committee meeting";
            let record = CommitteeMeeting {
                id: Uuid::new_v4(),
                student_id: student,
                date: require(status, "date", meeting.date)?,
                employees: require(status, "employees", meeting.employees.clone())?,
                representatives: require(
                    status,
                    "representatives",
                    meeting.representatives.clone(),
                )?,
                reason: require(status, "reason", meeting.reason.clone())?,
                decision: require(status, "decision", meeting.decision.clone())?,
                note: meeting.note.clone(),
            };

            self.collection::<CommitteeMeeting>(COMMITTEE_COLLECTION_NAME)
                .insert_one_with_session(&record, None, session)
                .await
                .map_err(Problem::from)?;
        }

        Ok(())
    }

    async fn save_dormitory(
        &self,
        student: Uuid,
        payload: &DormitoryPayload,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        match payload.triage("dormitory")? {
            SaveAction::Clear => {
                self.clear_record(
                    DORMITORY_COLLECTION_NAME,
                    EntityKind::Dormitory,
                    "Dormitory placement",
                    student,
                    session,
                )
                .await
            }
            SaveAction::Save => {
                let files = normalize_file_refs(&payload.files)?;
                let room_id = require("dormitory", "room_id", payload.room_id)?;
                let check_in = require("dormitory", "check_in", payload.check_in)?;

                let room = self
                    .get_room(room_id)
                    .await?
                    .ok_or_else(|| problems::not_found("Room", room_id))?;

                let occupancy = self.room_occupancy(room_id, check_in, Some(student)).await?;
                if occupancy >= room.capacity as usize {
                    return Err(problems::conflict(
                        "Room is already full.",
                        format!(
                            "Room '{}' houses {}/{} residents on the check-in date.",
                            room.name, occupancy, room.capacity
                        ),
                    ));
                }

                let id = self
                    .record_id_for_save(DORMITORY_COLLECTION_NAME, student, session)
                    .await?;

                let record = DormitoryStatus {
                    id,
                    student_id: student,
                    room_id,
                    check_in,
                    check_out: payload.check_out,
                    note: payload.note.clone(),
                };
                self.upsert_record(DORMITORY_COLLECTION_NAME, student, &record, session)
                    .await?;
                self.claim_files(&files, Owner::new(EntityKind::Dormitory, id))
                    .await
            }
        }
    }

    async fn fetch_statuses(&self, student: Uuid) -> Result<StudentStatuses, Problem> {
        let orphan = self
            .collection::<OrphanStatus>(ORPHAN_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        let disability = self
            .collection::<DisabilityStatus>(DISABILITY_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        let special_needs = self
            .collection::<SpecialNeedsStatus>(SPECIAL_NEEDS_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        let wartime = self
            .collection::<WartimeStatus>(WARTIME_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        let scholarship = self
            .collection::<ScholarshipStatus>(SCHOLARSHIP_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        let risk_registry = self
            .collection::<RiskRegistryStatus>(RISK_REGISTRY_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        let dormitory = self
            .collection::<DormitoryStatus>(DORMITORY_COLLECTION_NAME)
            .find_one(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;

        let mut committee = vec![];
        let mut cursor = self
            .collection::<CommitteeMeeting>(COMMITTEE_COLLECTION_NAME)
            .find(filter::by_student(student), None)
            .await
            .map_err(Problem::from)?;
        while let Some(meeting) = cursor.next().await {
            committee.push(meeting.map_err(Problem::from)?);
        }

        Ok(StudentStatuses {
            orphan,
            disability,
            special_needs,
            wartime,
            scholarship,
            risk_registry,
            committee,
            dormitory,
        })
    }

    async fn assert_student_unreferenced(&self, student: Uuid) -> Result<(), Problem> {
        self.assert_no_files(Owner::new(EntityKind::Student, student), "Student")
            .await?;

        for (collection, kind, label) in STATUS_COLLECTIONS {
            let mut cursor = self
                .collection::<Document>(collection)
                .find(filter::by_student(student), None)
                .await
                .map_err(Problem::from)?;

            while let Some(doc) = cursor.next().await {
                let doc = doc.map_err(Problem::from)?;
                if let Some(id) = filter::doc_uuid(&doc, "_id") {
                    self.assert_no_files(Owner::new(*kind, id), label).await?;
                }
            }
        }

        Ok(())
    }

    async fn delete_statuses(
        &self,
        student: Uuid,
        session: &mut ClientSession,
    ) -> Result<(), Problem> {
        for (collection, _, _) in STATUS_COLLECTIONS {
            self.collection::<Document>(collection)
                .delete_many_with_session(filter::by_student(student), None, session)
                .await
                .map_err(Problem::from)?;
        }
        Ok(())
    }
}
