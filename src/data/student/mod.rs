use chrono::NaiveDate;
use regex::Regex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::status::{
    CommitteeMeetingPayload, DecreePayload, DisabilityPayload, DormitoryPayload,
    RiskRegistryPayload, ServicePayload,
};
use crate::resp::problem::{problems, Problem};

pub mod db;
pub mod query;

pub static STUDENT_COLLECTION_NAME: &str = "students";

lazy_static! {
    /// `+7 (XXX)-XXX-XX-XX`
    static ref PHONE_PATTERN: Regex =
        Regex::new(r"^\+7 \(\d{3}\)-\d{3}-\d{2}-\d{2}$").expect("phone pattern is valid");
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Funding {
    Budget,
    Contract,
    Paid,
}

/// Completed education level at admission.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Education {
    NineGrades,
    ElevenGrades,
    Vocational,
    Higher,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Student {
    #[serde(default = "Uuid::new_v4", rename = "_id")]
    pub id: Uuid,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub gender: Option<Gender>,
    pub phone: String,
    pub funding: Funding,
    pub education: Education,
    pub department: Uuid,
    pub group: String,
    pub admission_year: i32,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub expulsion_info: Option<String>,
    #[serde(default)]
    pub expulsion_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub parent_info: Option<String>,
    #[serde(default)]
    pub penalties: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        match &self.middle_name {
            Some(middle) => format!("{} {} {}", self.last_name, self.first_name, middle),
            None => format!("{} {}", self.last_name, self.first_name),
        }
    }
}

/// Create/update body: the student's own fields plus one optional section per
/// status kind. An omitted section leaves the stored record alone; a present
/// but empty one clears it.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StudentPayload {
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub gender: Option<Gender>,
    pub phone: String,
    pub funding: Funding,
    pub education: Education,
    pub department: Uuid,
    pub group: String,
    pub admission_year: i32,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub expulsion_info: Option<String>,
    #[serde(default)]
    pub expulsion_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub parent_info: Option<String>,
    #[serde(default)]
    pub penalties: Option<String>,

    #[serde(default)]
    pub orphan: Option<DecreePayload>,
    #[serde(default)]
    pub disability: Option<DisabilityPayload>,
    #[serde(default)]
    pub special_needs: Option<DecreePayload>,
    #[serde(default)]
    pub wartime: Option<ServicePayload>,
    #[serde(default)]
    pub scholarship: Option<ServicePayload>,
    #[serde(default)]
    pub risk_registry: Option<RiskRegistryPayload>,
    #[serde(default)]
    pub committee: Option<Vec<CommitteeMeetingPayload>>,
    #[serde(default)]
    pub dormitory: Option<DormitoryPayload>,
}

impl StudentPayload {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.last_name.trim().is_empty() {
            return Err(problems::missing_field("last_name"));
        }
        if self.first_name.trim().is_empty() {
            return Err(problems::missing_field("first_name"));
        }
        if self.group.trim().is_empty() {
            return Err(problems::missing_field("group"));
        }

        if !PHONE_PATTERN.is_match(&self.phone) {
            return Err(problems::validation(
                "Bad phone number.",
                "Phone numbers must look like '+7 (XXX)-XXX-XX-XX'.",
            ));
        }

        if !(1000..=9999).contains(&self.admission_year) {
            return Err(problems::validation(
                "Bad admission year.",
                "Admission year must be a 4-digit number.",
            ));
        }
        if let Some(graduation) = self.graduation_year {
            if !(1000..=9999).contains(&graduation) {
                return Err(problems::validation(
                    "Bad graduation year.",
                    "Graduation year must be a 4-digit number.",
                ));
            }
        }

        Ok(())
    }

    /// Builds the student record this payload describes, keeping `id`.
    pub fn into_student(&self, id: Uuid) -> Result<Student, Problem> {
        self.validate()?;

        Ok(Student {
            id,
            last_name: self.last_name.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            middle_name: self.middle_name.clone(),
            birth_date: self.birth_date,
            gender: self.gender,
            phone: self.phone.clone(),
            funding: self.funding,
            education: self.education,
            department: self.department,
            group: self.group.trim().to_string(),
            admission_year: self.admission_year,
            graduation_year: self.graduation_year,
            expulsion_info: self.expulsion_info.clone(),
            expulsion_date: self.expulsion_date,
            note: self.note.clone(),
            parent_info: self.parent_info.clone(),
            penalties: self.penalties.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> StudentPayload {
        StudentPayload {
            last_name: "Ivanov".to_string(),
            first_name: "Ivan".to_string(),
            middle_name: None,
            birth_date: NaiveDate::from_ymd_opt(2005, 1, 15).unwrap(),
            gender: Some(Gender::Male),
            phone: "+7 (999)-123-45-67".to_string(),
            funding: Funding::Budget,
            education: Education::NineGrades,
            department: Uuid::new_v4(),
            group: "CS-21-1".to_string(),
            admission_year: 2021,
            graduation_year: Some(2025),
            expulsion_info: None,
            expulsion_date: None,
            note: None,
            parent_info: None,
            penalties: None,
            orphan: None,
            disability: None,
            special_needs: None,
            wartime: None,
            scholarship: None,
            risk_registry: None,
            committee: None,
            dormitory: None,
        }
    }

    #[test]
    fn well_formed_payload_passes() {
        assert!(payload().validate().is_ok());
    }

    #[test]
    fn phone_format_is_enforced() {
        for bad in ["+7 999 123 45 67", "89991234567", "+7 (999)-123-45-678", ""] {
            let mut p = payload();
            p.phone = bad.to_string();
            assert!(p.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn admission_year_must_have_four_digits() {
        let mut p = payload();
        p.admission_year = 21;
        assert!(p.validate().is_err());
        p.admission_year = 12021;
        assert!(p.validate().is_err());
    }

    #[test]
    fn payload_round_trips_into_student() {
        let id = Uuid::new_v4();
        let student = payload().into_student(id).unwrap();
        assert_eq!(student.id, id);
        assert_eq!(student.full_name(), "Ivanov Ivan");
    }
}
