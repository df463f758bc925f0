//! Filter-query evaluation.
//!
//! Every criterion narrows the result: per-kind status constraints each
//! produce a student-id set and the final candidate set is their
//! intersection, never a union. Scalar predicates are applied to the
//! remaining students afterwards.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::data::dates::{is_adult_on, is_enrolled_on, Activity};
use crate::data::status::{OwnedRecord, Temporal};
use crate::data::student::Student;
use crate::resp::problem::{problems, Problem};

/// Requested state of one status kind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, FromFormField, ToSchema)]
pub enum StatusFilter {
    /// Record active at the reference day (`?orphan=true`).
    #[field(value = "true")]
    Active,
    /// Record exists, dates ignored (`?orphan=all`).
    #[field(value = "all")]
    Any,
    /// Record exists but has run out (`?orphan=expired`).
    #[field(value = "expired")]
    Expired,
}

/// Whether a record with the given derived activity satisfies a filter.
pub fn matches_filter(filter: StatusFilter, activity: Option<Activity>) -> bool {
    match filter {
        StatusFilter::Active => activity == Some(Activity::Active),
        StatusFilter::Expired => activity == Some(Activity::Expired),
        StatusFilter::Any => true,
    }
}

/// Ids of students whose record satisfies `filter` at `as_of`.
pub fn matching_ids<T: Temporal + OwnedRecord>(
    records: &[T],
    filter: StatusFilter,
    as_of: NaiveDate,
) -> HashSet<Uuid> {
    records
        .iter()
        .filter(|r| matches_filter(filter, r.activity_on(as_of)))
        .map(|r| r.student_id())
        .collect()
}

/// Intersection of all constraint sets; `None` when nothing constrains.
pub fn intersect(sets: Vec<HashSet<Uuid>>) -> Option<HashSet<Uuid>> {
    let mut iter = sets.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, set| {
        acc.intersection(&set).copied().collect()
    }))
}

#[derive(Debug, Clone, Default, FromForm, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StudentQuery {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub group: Option<String>,
    pub admission_year: Option<i32>,
    pub graduation_year: Option<i32>,
    /// Reference day, `YYYY-MM-DD`; defaults to today.
    pub as_of: Option<String>,
    pub room: Option<String>,
    pub adult: Option<bool>,
    pub enrolled: Option<bool>,
    pub expelled: Option<bool>,
    pub committee: Option<bool>,

    pub orphan: Option<StatusFilter>,
    pub disability: Option<StatusFilter>,
    pub special_needs: Option<StatusFilter>,
    pub wartime: Option<StatusFilter>,
    pub scholarship: Option<StatusFilter>,
    pub risk_group: Option<StatusFilter>,
    pub register: Option<StatusFilter>,
    pub dormitory: Option<StatusFilter>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl StudentQuery {
    pub fn reference_date(&self) -> Result<NaiveDate, Problem> {
        match &self.as_of {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                problems::validation(
                    "Bad reference date.",
                    "The 'as_of' parameter must be formatted as YYYY-MM-DD.",
                )
            }),
            None => Ok(Utc::now().date_naive()),
        }
    }

    /// Scalar predicates; status-set membership is handled separately.
    pub fn matches_student(&self, student: &Student, as_of: NaiveDate) -> bool {
        if let Some(last_name) = &self.last_name {
            if !contains_ci(&student.last_name, last_name) {
                return false;
            }
        }
        if let Some(first_name) = &self.first_name {
            if !contains_ci(&student.first_name, first_name) {
                return false;
            }
        }
        if let Some(group) = &self.group {
            if !contains_ci(&student.group, group) {
                return false;
            }
        }
        if let Some(year) = self.admission_year {
            if student.admission_year != year {
                return false;
            }
        }
        if let Some(year) = self.graduation_year {
            if student.graduation_year != Some(year) {
                return false;
            }
        }
        if let Some(adult) = self.adult {
            if is_adult_on(student.birth_date, as_of) != adult {
                return false;
            }
        }
        if let Some(enrolled) = self.enrolled {
            let is_enrolled =
                is_enrolled_on(student.admission_year, student.graduation_year, as_of);
            if is_enrolled != enrolled {
                return false;
            }
        }
        if let Some(expelled) = self.expelled {
            let is_expelled = student
                .expulsion_info
                .as_deref()
                .map(|info| !info.trim().is_empty())
                .unwrap_or(false);
            if is_expelled != expelled {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::student::{Education, Funding};
    use crate::data::status::{DisabilityStatus, OrphanStatus};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn orphan(student: Uuid, start: NaiveDate, end: Option<NaiveDate>) -> OrphanStatus {
        OrphanStatus {
            id: Uuid::new_v4(),
            student_id: student,
            decree: "No. 1".to_string(),
            start_date: start,
            end_date: end,
            note: None,
        }
    }

    fn disability(student: Uuid, start: NaiveDate, end: Option<NaiveDate>) -> DisabilityStatus {
        DisabilityStatus {
            id: Uuid::new_v4(),
            student_id: student,
            decree: "No. 2".to_string(),
            disability_type: "II".to_string(),
            start_date: start,
            end_date: end,
            note: None,
        }
    }

    fn student(birth: NaiveDate, admission: i32, graduation: Option<i32>) -> Student {
        Student {
            id: Uuid::new_v4(),
            last_name: "Ivanov".to_string(),
            first_name: "Ivan".to_string(),
            middle_name: None,
            birth_date: birth,
            gender: None,
            phone: "+7 (999)-123-45-67".to_string(),
            funding: Funding::Budget,
            education: Education::NineGrades,
            department: Uuid::new_v4(),
            group: "CS-21-1".to_string(),
            admission_year: admission,
            graduation_year: graduation,
            expulsion_info: None,
            expulsion_date: None,
            note: None,
            parent_info: None,
            penalties: None,
        }
    }

    #[test]
    fn intersection_never_unions() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let orphans: HashSet<_> = [a, b].into_iter().collect();
        let disabled: HashSet<_> = [b, c].into_iter().collect();
        let scholars: HashSet<_> = [a, b, c].into_iter().collect();

        let combined = intersect(vec![orphans, disabled, scholars]).unwrap();
        assert_eq!(combined, [b].into_iter().collect());
    }

    #[test]
    fn disjoint_sets_intersect_to_nothing() {
        let orphans: HashSet<_> = [Uuid::new_v4()].into_iter().collect();
        let disabled: HashSet<_> = [Uuid::new_v4()].into_iter().collect();
        let wartime: HashSet<_> = [Uuid::new_v4()].into_iter().collect();

        let combined = intersect(vec![orphans, disabled, wartime]).unwrap();
        assert!(combined.is_empty());
    }

    #[test]
    fn no_constraints_means_no_candidate_set() {
        assert!(intersect(vec![]).is_none());
    }

    #[test]
    fn active_orphan_with_expired_disability() {
        // Student with an open-ended orphan status and a disability that
        // lapsed in mid-2023.
        let a = Uuid::new_v4();
        let orphans = vec![orphan(a, d(2024, 1, 1), None)];
        let disabilities = vec![disability(a, d(2023, 1, 1), Some(d(2023, 6, 1)))];
        let as_of = d(2024, 6, 1);

        let both_active = intersect(vec![
            matching_ids(&orphans, StatusFilter::Active, as_of),
            matching_ids(&disabilities, StatusFilter::Active, as_of),
        ])
        .unwrap();
        assert!(both_active.is_empty());

        let orphan_and_lapsed = intersect(vec![
            matching_ids(&orphans, StatusFilter::Active, as_of),
            matching_ids(&disabilities, StatusFilter::Expired, as_of),
        ])
        .unwrap();
        assert_eq!(orphan_and_lapsed, [a].into_iter().collect());
    }

    #[test]
    fn boundary_days_resolve_to_active() {
        let a = Uuid::new_v4();
        let records = vec![orphan(a, d(2024, 6, 1), Some(d(2024, 9, 1)))];

        // Reference equal to the start day.
        assert!(matching_ids(&records, StatusFilter::Active, d(2024, 6, 1)).contains(&a));
        // Reference equal to the (inclusive) end day.
        assert!(matching_ids(&records, StatusFilter::Active, d(2024, 9, 1)).contains(&a));
        assert!(matching_ids(&records, StatusFilter::Expired, d(2024, 9, 1)).is_empty());
        // One day past the end.
        assert!(matching_ids(&records, StatusFilter::Expired, d(2024, 9, 2)).contains(&a));
    }

    #[test]
    fn any_matches_regardless_of_dates() {
        let a = Uuid::new_v4();
        let records = vec![orphan(a, d(2030, 1, 1), None)];

        assert!(matching_ids(&records, StatusFilter::Active, d(2024, 1, 1)).is_empty());
        assert!(matching_ids(&records, StatusFilter::Any, d(2024, 1, 1)).contains(&a));
    }

    #[test]
    fn scalar_predicates_narrow_candidates() {
        let s = student(d(2004, 5, 1), 2021, Some(2025));
        let as_of = d(2024, 6, 1);

        let mut q = StudentQuery {
            last_name: Some("iva".to_string()),
            ..Default::default()
        };
        assert!(q.matches_student(&s, as_of));

        q.group = Some("cs-21".to_string());
        assert!(q.matches_student(&s, as_of));

        q.admission_year = Some(2022);
        assert!(!q.matches_student(&s, as_of));
    }

    #[test]
    fn adult_and_enrollment_predicates() {
        let minor = student(d(2008, 1, 1), 2023, Some(2027));
        let adult = student(d(2000, 1, 1), 2018, Some(2022));
        let as_of = d(2024, 6, 1);

        let adults_only = StudentQuery {
            adult: Some(true),
            ..Default::default()
        };
        assert!(!adults_only.matches_student(&minor, as_of));
        assert!(adults_only.matches_student(&adult, as_of));

        let enrolled_only = StudentQuery {
            enrolled: Some(true),
            ..Default::default()
        };
        assert!(enrolled_only.matches_student(&minor, as_of));
        assert!(!enrolled_only.matches_student(&adult, as_of));
    }

    #[test]
    fn bad_reference_date_is_rejected() {
        let q = StudentQuery {
            as_of: Some("06/01/2024".to_string()),
            ..Default::default()
        };
        assert!(q.reference_date().is_err());
    }
}
