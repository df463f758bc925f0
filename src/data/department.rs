use bson::doc;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::data::store::Store;
use crate::data::student::STUDENT_COLLECTION_NAME;
use crate::resp::problem::{problems, Problem};

pub static DEPARTMENT_COLLECTION_NAME: &str = "departments";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Department {
    #[serde(default = "Uuid::new_v4", rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DepartmentData {
    pub name: String,
    pub code: String,
}

impl DepartmentData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.name.trim().is_empty() {
            return Err(problems::missing_field("name"));
        }

        let code = self.code.trim();
        if !(2..=5).contains(&code.len())
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(problems::validation(
                "Bad department code.",
                "Department code must be 2-5 alphanumeric characters.",
            ));
        }

        Ok(())
    }

    pub fn into_department(self) -> Department {
        Department {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            code: self.code.trim().to_uppercase(),
        }
    }
}

/// Synthesizes a group label from a department code, admission year, and a
/// subgroup digit, e.g. `("CS", 2021, 3)` becomes `CS-21-3`.
pub fn group_label(code: &str, admission_year: i32, subgroup: u8) -> String {
    format!(
        "{}-{:02}-{}",
        code.to_uppercase(),
        admission_year.rem_euclid(100),
        subgroup
    )
}

pub trait DepartmentDbExt {
    async fn list_departments(&self) -> Result<Vec<Department>, Problem>;
    async fn get_department(&self, id: Uuid) -> Result<Option<Department>, Problem>;
    async fn create_department(&self, data: DepartmentData) -> Result<Department, Problem>;
    async fn update_department(
        &self,
        id: Uuid,
        data: DepartmentData,
    ) -> Result<Option<Department>, Problem>;
    async fn delete_department(&self, id: Uuid) -> Result<Option<Department>, Problem>;
}

impl DepartmentDbExt for Store {
    async fn list_departments(&self) -> Result<Vec<Department>, Problem> {
        let mut cursor = self
            .collection::<Department>(DEPARTMENT_COLLECTION_NAME)
            .find(None, None)
            .await
            .map_err(Problem::from)?;

        let mut departments = vec![];
        while let Some(department) = cursor.next().await {
            match department {
                Ok(it) => departments.push(it),
                Err(_) => tracing::warn!("Unable to deserialize department document."),
            }
        }

        Ok(departments)
    }

    async fn get_department(&self, id: Uuid) -> Result<Option<Department>, Problem> {
        self.collection::<Department>(DEPARTMENT_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn create_department(&self, data: DepartmentData) -> Result<Department, Problem> {
        data.validate()?;
        let department = data.into_department();

        let duplicate = self
            .collection::<Department>(DEPARTMENT_COLLECTION_NAME)
            .find_one(
                doc! { "$or": [
                    { "name": &department.name },
                    { "code": &department.code },
                ]},
                None,
            )
            .await
            .map_err(Problem::from)?;
        if duplicate.is_some() {
            return Err(problems::conflict(
                "Department already exists.",
                "Another department uses the same name or code.",
            ));
        }

        self.collection::<Department>(DEPARTMENT_COLLECTION_NAME)
            .insert_one(&department, None)
            .await
            .map_err(Problem::from)?;

        Ok(department)
    }

    async fn update_department(
        &self,
        id: Uuid,
        data: DepartmentData,
    ) -> Result<Option<Department>, Problem> {
        data.validate()?;

        let mut department = data.into_department();
        department.id = id;

        self.collection::<Department>(DEPARTMENT_COLLECTION_NAME)
            .find_one_and_replace(filter::by_id(id), &department, None)
            .await
            .map_err(Problem::from)
            .map(|existing| existing.map(|_| department))
    }

    async fn delete_department(&self, id: Uuid) -> Result<Option<Department>, Problem> {
        let referencing = self
            .collection::<bson::Document>(STUDENT_COLLECTION_NAME)
            .count_documents(doc! { "department": filter::uuid_bson(id) }, None)
            .await
            .map_err(Problem::from)?;
        if referencing > 0 {
            return Err(problems::conflict(
                "Department is still in use.",
                format!("{} students reference this department.", referencing),
            ));
        }

        self.collection::<Department>(DEPARTMENT_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_label_uses_two_digit_year_suffix() {
        assert_eq!(group_label("CS", 2021, 3), "CS-21-3");
        assert_eq!(group_label("it", 2005, 1), "IT-05-1");
        assert_eq!(group_label("AD", 2100, 2), "AD-00-2");
    }

    #[test]
    fn department_code_is_validated() {
        let bad = DepartmentData {
            name: "Automation".to_string(),
            code: "A".to_string(),
        };
        assert!(bad.validate().is_err());

        let good = DepartmentData {
            name: "Automation".to_string(),
            code: "au".to_string(),
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.into_department().code, "AU");
    }
}
