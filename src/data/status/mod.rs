//! Welfare status records and their save-payload validation.
//!
//! Seven status kinds plus dormitory placement share one lifecycle: a record
//! is created on the first save that populates any of its fields, overwritten
//! in place on later saves, and classified as active or expired purely from
//! its date range (see [`crate::data::dates`]). Whether a partially filled
//! payload is saved, rejected, or clears the stored record is decided by one
//! field-presence triage shared by every kind instead of per-kind checks.

use chrono::NaiveDate;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::dates::{classify, Activity};
use crate::resp::problem::{problems, Problem};

pub mod db;

pub static ORPHAN_COLLECTION_NAME: &str = "status.orphan";
pub static DISABILITY_COLLECTION_NAME: &str = "status.disability";
pub static SPECIAL_NEEDS_COLLECTION_NAME: &str = "status.special_needs";
pub static WARTIME_COLLECTION_NAME: &str = "status.wartime";
pub static SCHOLARSHIP_COLLECTION_NAME: &str = "status.scholarship";
pub static RISK_REGISTRY_COLLECTION_NAME: &str = "status.risk_registry";
pub static COMMITTEE_COLLECTION_NAME: &str = "status.committee";
pub static DORMITORY_COLLECTION_NAME: &str = "status.dormitory";

fn new_record_id() -> Uuid {
    Uuid::new_v4()
}

/// Record owned by a single student.
pub trait OwnedRecord {
    fn student_id(&self) -> Uuid;
}

/// Record with a day-granular validity range.
pub trait Temporal {
    fn valid_from(&self) -> NaiveDate;
    fn valid_until(&self) -> Option<NaiveDate>;

    fn activity_on(&self, as_of: NaiveDate) -> Option<Activity> {
        classify(self.valid_from(), self.valid_until(), as_of)
    }
}

macro_rules! impl_owned {
    ($($record:ty),+) => {
        $(impl OwnedRecord for $record {
            fn student_id(&self) -> Uuid {
                self.student_id
            }
        })+
    };
}

macro_rules! impl_temporal {
    ($($record:ty),+) => {
        $(impl Temporal for $record {
            fn valid_from(&self) -> NaiveDate {
                self.start_date
            }

            fn valid_until(&self) -> Option<NaiveDate> {
                self.end_date
            }
        })+
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrphanStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    /// Reference of the decree establishing the status.
    pub decree: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisabilityStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub decree: String,
    pub disability_type: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpecialNeedsStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub decree: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WartimeStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScholarshipStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Discriminates preventive risk-group follow-up from the formal register.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    RiskGroup,
    Register,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskRegistryStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub kind: RiskKind,
    pub start_date: NaiveDate,
    pub start_reason: String,
    pub start_basis: String,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_reason: Option<String>,
    #[serde(default)]
    pub end_basis: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Prevention-committee meeting minutes; unlike the other kinds a student
/// accumulates any number of these.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitteeMeeting {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub employees: String,
    pub representatives: String,
    pub reason: String,
    pub decision: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DormitoryStatus {
    #[serde(default = "new_record_id", rename = "_id")]
    pub id: Uuid,
    pub student_id: Uuid,
    pub room_id: Uuid,
    pub check_in: NaiveDate,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

impl_owned!(
    OrphanStatus,
    DisabilityStatus,
    SpecialNeedsStatus,
    WartimeStatus,
    ScholarshipStatus,
    RiskRegistryStatus,
    CommitteeMeeting,
    DormitoryStatus
);

impl_temporal!(
    OrphanStatus,
    DisabilityStatus,
    SpecialNeedsStatus,
    WartimeStatus,
    ScholarshipStatus,
    RiskRegistryStatus
);

impl Temporal for DormitoryStatus {
    fn valid_from(&self) -> NaiveDate {
        self.check_in
    }

    fn valid_until(&self) -> Option<NaiveDate> {
        self.check_out
    }
}

/// A file reference in a save payload: either a `{"file_id": ...}` object or
/// the composite `url|fileId` string the upload widget produces.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum FileRef {
    Object {
        #[serde(rename = "file_id", alias = "fileId")]
        file_id: Uuid,
    },
    Text(String),
}

impl FileRef {
    pub fn file_id(&self) -> Option<Uuid> {
        match self {
            FileRef::Object { file_id } => Some(*file_id),
            FileRef::Text(text) => {
                let raw = match text.rsplit_once('|') {
                    Some((_, id)) => id,
                    None => text.as_str(),
                };
                Uuid::parse_str(raw).ok()
            }
        }
    }
}

/// Normalizes payload file references to bare file ids.
pub fn normalize_file_refs(refs: &[FileRef]) -> Result<Vec<Uuid>, Problem> {
    refs.iter()
        .map(|r| {
            r.file_id().ok_or_else(|| {
                problems::validation(
                    "Bad file reference.",
                    "File references must be file ids or 'url|fileId' strings.",
                )
            })
        })
        .collect()
}

/// Outcome of triaging a status payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SaveAction {
    /// No field populated: drop any stored record, create nothing.
    Clear,
    /// Full required set present: upsert the record.
    Save,
}

pub struct FieldPresence {
    pub name: &'static str,
    pub present: bool,
    pub required: bool,
}

#[inline]
fn field(name: &'static str, present: bool, required: bool) -> FieldPresence {
    FieldPresence {
        name,
        present,
        required,
    }
}

#[inline]
fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

pub fn status_fields_missing(status: &str, missing: &[&str]) -> Problem {
    problems::validation(
        format!("Required fields missing for status '{}'.", status),
        format!("The following fields must be filled in together: {}.", missing.join(", ")),
    )
}

/// Decides what to do with a status payload: every kind follows the same
/// rule, parameterized only by which fields are required together.
///
/// A payload with nothing populated clears the record; one with anything
/// populated must carry its kind's full required set or is rejected.
pub fn triage(status: &str, fields: &[FieldPresence]) -> Result<SaveAction, Problem> {
    if !fields.iter().any(|f| f.present) {
        return Ok(SaveAction::Clear);
    }

    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| f.required && !f.present)
        .map(|f| f.name)
        .collect();

    if missing.is_empty() {
        Ok(SaveAction::Save)
    } else {
        Err(status_fields_missing(status, &missing))
    }
}

/// Extracts a required payload field; [`triage`] makes this unreachable for
/// payloads it approved, but saves still propagate rather than unwrap.
pub fn require<T>(status: &str, name: &'static str, value: Option<T>) -> Result<T, Problem> {
    value.ok_or_else(|| status_fields_missing(status, &[name]))
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DecreePayload {
    #[serde(default)]
    pub decree: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl DecreePayload {
    pub fn triage(&self, status: &str) -> Result<SaveAction, Problem> {
        triage(
            status,
            &[
                field("decree", present(&self.decree), true),
                field("start_date", self.start_date.is_some(), true),
                field("end_date", self.end_date.is_some(), false),
                field("note", present(&self.note), false),
                field("files", !self.files.is_empty(), false),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DisabilityPayload {
    #[serde(default)]
    pub decree: Option<String>,
    #[serde(default)]
    pub disability_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl DisabilityPayload {
    pub fn triage(&self, status: &str) -> Result<SaveAction, Problem> {
        triage(
            status,
            &[
                field("decree", present(&self.decree), true),
                field("disability_type", present(&self.disability_type), true),
                field("start_date", self.start_date.is_some(), true),
                field("end_date", self.end_date.is_some(), false),
                field("note", present(&self.note), false),
                field("files", !self.files.is_empty(), false),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ServicePayload {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl ServicePayload {
    pub fn triage(&self, status: &str) -> Result<SaveAction, Problem> {
        triage(
            status,
            &[
                field("start_date", self.start_date.is_some(), true),
                field("end_date", self.end_date.is_some(), false),
                field("note", present(&self.note), false),
                field("files", !self.files.is_empty(), false),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RiskRegistryPayload {
    #[serde(default)]
    pub kind: Option<RiskKind>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_reason: Option<String>,
    #[serde(default)]
    pub start_basis: Option<String>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_reason: Option<String>,
    #[serde(default)]
    pub end_basis: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl RiskRegistryPayload {
    pub fn triage(&self, status: &str) -> Result<SaveAction, Problem> {
        triage(
            status,
            &[
                field("kind", self.kind.is_some(), true),
                field("start_date", self.start_date.is_some(), true),
                field("start_reason", present(&self.start_reason), true),
                field("start_basis", present(&self.start_basis), true),
                field("end_date", self.end_date.is_some(), false),
                field("end_reason", present(&self.end_reason), false),
                field("end_basis", present(&self.end_basis), false),
                field("note", present(&self.note), false),
                field("files", !self.files.is_empty(), false),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CommitteeMeetingPayload {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub employees: Option<String>,
    #[serde(default)]
    pub representatives: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl CommitteeMeetingPayload {
    fn triage(&self, index: usize) -> Result<SaveAction, Problem> {
        triage(
            // 1-based in messages; the form shows meetings numbered from 1.
            &format!("committee meeting #{}", index + 1),
            &[
                field("date", self.date.is_some(), true),
                field("employees", present(&self.employees), true),
                field("representatives", present(&self.representatives), true),
                field("reason", present(&self.reason), true),
                field("decision", present(&self.decision), true),
                field("note", present(&self.note), false),
            ],
        )
    }
}

/// Filters a meeting list down to the complete entries; a partially filled
/// meeting rejects the whole save, naming the offending entry.
pub fn complete_meetings(
    meetings: &[CommitteeMeetingPayload],
) -> Result<Vec<&CommitteeMeetingPayload>, Problem> {
    let mut complete = vec![];
    for (index, meeting) in meetings.iter().enumerate() {
        match meeting.triage(index)? {
            SaveAction::Save => complete.push(meeting),
            SaveAction::Clear => {}
        }
    }
    Ok(complete)
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DormitoryPayload {
    #[serde(default)]
    pub room_id: Option<Uuid>,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl DormitoryPayload {
    pub fn triage(&self, status: &str) -> Result<SaveAction, Problem> {
        triage(
            status,
            &[
                field("room_id", self.room_id.is_some(), true),
                field("check_in", self.check_in.is_some(), true),
                field("check_out", self.check_out.is_some(), false),
                field("note", present(&self.note), false),
                field("files", !self.files.is_empty(), false),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn empty_payload_clears() {
        let payload = DecreePayload::default();
        assert_eq!(payload.triage("orphan").unwrap(), SaveAction::Clear);
    }

    #[test]
    fn blank_strings_count_as_absent() {
        let payload = DecreePayload {
            decree: Some("  ".to_string()),
            note: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(payload.triage("orphan").unwrap(), SaveAction::Clear);
    }

    #[test]
    fn complete_required_group_saves() {
        let payload = DecreePayload {
            decree: Some("No. 117-c".to_string()),
            start_date: Some(d(2024, 1, 1)),
            ..Default::default()
        };
        assert_eq!(payload.triage("orphan").unwrap(), SaveAction::Save);
    }

    #[test]
    fn partial_payload_is_rejected() {
        // A lone note is enough to demand the full required group.
        let payload = DecreePayload {
            note: Some("guardian contacts attached".to_string()),
            ..Default::default()
        };
        let err = payload.triage("orphan").unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert!(err.title.contains("orphan"));
    }

    #[test]
    fn disability_requires_type_whenever_anything_is_set() {
        let payload = DisabilityPayload {
            decree: Some("No. 5".to_string()),
            start_date: Some(d(2023, 1, 1)),
            ..Default::default()
        };
        let err = payload.triage("disability").unwrap_err();
        assert!(err
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("disability_type"));
    }

    #[test]
    fn risk_registry_requires_reason_and_basis() {
        let payload = RiskRegistryPayload {
            kind: Some(RiskKind::RiskGroup),
            start_date: Some(d(2024, 2, 1)),
            ..Default::default()
        };
        let err = payload.triage("risk registry").unwrap_err();
        let detail = err.detail.unwrap_or_default();
        assert!(detail.contains("start_reason"));
        assert!(detail.contains("start_basis"));
    }

    #[test]
    fn committee_rejection_names_the_meeting() {
        let meetings = vec![
            CommitteeMeetingPayload {
                date: Some(d(2024, 3, 1)),
                employees: Some("Petrova, Sidorov".to_string()),
                representatives: Some("mother".to_string()),
                reason: Some("attendance".to_string()),
                decision: Some("warning".to_string()),
                note: None,
            },
            CommitteeMeetingPayload {
                date: Some(d(2024, 4, 1)),
                ..Default::default()
            },
        ];

        let err = complete_meetings(&meetings).unwrap_err();
        assert!(err.title.contains("#2"));
    }

    #[test]
    fn committee_blank_entries_are_dropped() {
        let meetings = vec![
            CommitteeMeetingPayload::default(),
            CommitteeMeetingPayload {
                date: Some(d(2024, 3, 1)),
                employees: Some("Petrova".to_string()),
                representatives: Some("father".to_string()),
                reason: Some("grades".to_string()),
                decision: Some("follow-up in May".to_string()),
                note: Some("second warning".to_string()),
            },
        ];

        let complete = complete_meetings(&meetings).unwrap();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].date, Some(d(2024, 3, 1)));
    }

    #[test]
    fn file_refs_normalize_both_shapes() {
        let id = Uuid::new_v4();
        let refs = vec![
            FileRef::Object { file_id: id },
            FileRef::Text(format!("/uploads/report.pdf|{}", id)),
            FileRef::Text(id.to_string()),
        ];

        let normalized = normalize_file_refs(&refs).unwrap();
        assert_eq!(normalized, vec![id, id, id]);
    }

    #[test]
    fn garbage_file_refs_are_rejected() {
        let refs = vec![FileRef::Text("not-a-file".to_string())];
        assert!(normalize_file_refs(&refs).is_err());
    }

    #[test]
    fn dormitory_record_classifies_by_check_dates() {
        let record = DormitoryStatus {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            check_in: d(2024, 1, 1),
            check_out: Some(d(2024, 5, 31)),
            note: None,
        };

        assert_eq!(record.activity_on(d(2024, 3, 1)), Some(Activity::Active));
        assert_eq!(record.activity_on(d(2024, 6, 1)), Some(Activity::Expired));
    }
}
