use bson::doc;
use chrono::NaiveDate;
use mongodb::options::FindOptions;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::dates::{classify, Activity};
use crate::data::filter;
use crate::data::status::{DormitoryStatus, DORMITORY_COLLECTION_NAME};
use crate::data::store::Store;
use crate::data::student::{Student, STUDENT_COLLECTION_NAME};
use crate::resp::problem::{problems, Problem};

pub static ROOM_COLLECTION_NAME: &str = "rooms";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Room {
    #[serde(default = "Uuid::new_v4", rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoomData {
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

impl RoomData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.name.trim().is_empty() {
            return Err(problems::missing_field("name"));
        }
        if self.capacity < 1 {
            return Err(problems::validation(
                "Bad room capacity.",
                "Room capacity must be at least 1.",
            ));
        }
        Ok(())
    }

    pub fn into_room(self) -> Room {
        Room {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            capacity: self.capacity,
            note: self.note,
        }
    }
}

/// A room's resident as of some reference day.
#[derive(Debug, Clone, Serialize)]
pub struct Occupant {
    pub student: Student,
    pub check_in: NaiveDate,
    pub check_out: Option<NaiveDate>,
    pub note: Option<String>,
}

/// Room enriched with derived occupancy; occupancy is never stored.
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    pub occupants: Vec<Occupant>,
    pub occupancy: usize,
    pub available: bool,
}

pub trait RoomDbExt {
    async fn list_rooms(&self) -> Result<Vec<Room>, Problem>;
    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, Problem>;
    async fn find_rooms_by_name(&self, name: &str) -> Result<Vec<Room>, Problem>;
    async fn rooms_with_occupants(&self, as_of: NaiveDate) -> Result<Vec<RoomView>, Problem>;

    /// Number of dormitory records for `room` active at `as_of`, not counting
    /// `exclude_student`'s own record.
    async fn room_occupancy(
        &self,
        room: Uuid,
        as_of: NaiveDate,
        exclude_student: Option<Uuid>,
    ) -> Result<usize, Problem>;

    async fn create_room(&self, data: RoomData) -> Result<Room, Problem>;
    async fn update_room(&self, id: Uuid, data: RoomData) -> Result<Option<Room>, Problem>;
    async fn delete_room(&self, id: Uuid) -> Result<Option<Room>, Problem>;
}

async fn active_dormitory_records(
    store: &Store,
    room: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<DormitoryStatus>, Problem> {
    let mut cursor = store
        .collection::<DormitoryStatus>(DORMITORY_COLLECTION_NAME)
        .find(filter::by_room(room), None)
        .await
        .map_err(Problem::from)?;

    let mut records = vec![];
    while let Some(record) = cursor.next().await {
        let record = record.map_err(Problem::from)?;
        if classify(record.check_in, record.check_out, as_of) == Some(Activity::Active) {
            records.push(record);
        }
    }

    Ok(records)
}

impl RoomDbExt for Store {
    async fn list_rooms(&self) -> Result<Vec<Room>, Problem> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let mut cursor = self
            .collection::<Room>(ROOM_COLLECTION_NAME)
            .find(None, options)
            .await
            .map_err(Problem::from)?;

        let mut rooms = vec![];
        while let Some(room) = cursor.next().await {
            match room {
                Ok(it) => rooms.push(it),
                Err(_) => tracing::warn!("Unable to deserialize room document."),
            }
        }

        Ok(rooms)
    }

    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, Problem> {
        self.collection::<Room>(ROOM_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_rooms_by_name(&self, name: &str) -> Result<Vec<Room>, Problem> {
        let mut cursor = self
            .collection::<Room>(ROOM_COLLECTION_NAME)
            .find(doc! { "name": name }, None)
            .await
            .map_err(Problem::from)?;

        let mut rooms = vec![];
        while let Some(room) = cursor.next().await {
            rooms.push(room.map_err(Problem::from)?);
        }

        Ok(rooms)
    }

    async fn rooms_with_occupants(&self, as_of: NaiveDate) -> Result<Vec<RoomView>, Problem> {
        let rooms = self.list_rooms().await?;

        let mut views = vec![];
        for room in rooms {
            let records = active_dormitory_records(self, room.id, as_of).await?;

            let mut occupants = vec![];
            for record in records {
                let student = self
                    .collection::<Student>(STUDENT_COLLECTION_NAME)
                    .find_one(filter::by_id(record.student_id), None)
                    .await
                    .map_err(Problem::from)?;

                // A dangling record shouldn't take the room listing down.
                if let Some(student) = student {
                    occupants.push(Occupant {
                        student,
                        check_in: record.check_in,
                        check_out: record.check_out,
                        note: record.note,
                    });
                }
            }

            let occupancy = occupants.len();
            let available = occupancy < room.capacity as usize;
            views.push(RoomView {
                room,
                occupants,
                occupancy,
                available,
            });
        }

        Ok(views)
    }

    async fn room_occupancy(
        &self,
        room: Uuid,
        as_of: NaiveDate,
        exclude_student: Option<Uuid>,
    ) -> Result<usize, Problem> {
        let records = active_dormitory_records(self, room, as_of).await?;
        Ok(records
            .iter()
            .filter(|r| Some(r.student_id) != exclude_student)
            .count())
    }

    async fn create_room(&self, data: RoomData) -> Result<Room, Problem> {
        data.validate()?;
        let room = data.into_room();

        let duplicate = self
            .collection::<Room>(ROOM_COLLECTION_NAME)
            .find_one(doc! { "name": &room.name }, None)
            .await
            .map_err(Problem::from)?;
        if duplicate.is_some() {
            return Err(problems::conflict(
                "Room already exists.",
                "Another room uses the same name.",
            ));
        }

        self.collection::<Room>(ROOM_COLLECTION_NAME)
            .insert_one(&room, None)
            .await
            .map_err(Problem::from)?;

        Ok(room)
    }

    async fn update_room(&self, id: Uuid, data: RoomData) -> Result<Option<Room>, Problem> {
        data.validate()?;

        let mut room = data.into_room();
        room.id = id;

        self.collection::<Room>(ROOM_COLLECTION_NAME)
            .find_one_and_replace(filter::by_id(id), &room, None)
            .await
            .map_err(Problem::from)
            .map(|existing| existing.map(|_| room))
    }

    async fn delete_room(&self, id: Uuid) -> Result<Option<Room>, Problem> {
        let referencing = self
            .collection::<DormitoryStatus>(DORMITORY_COLLECTION_NAME)
            .count_documents(filter::by_room(id), None)
            .await
            .map_err(Problem::from)?;
        if referencing > 0 {
            return Err(problems::conflict(
                "Room is still in use.",
                format!("{} dormitory records reference this room.", referencing),
            ));
        }

        self.collection::<Room>(ROOM_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_rooms_are_rejected() {
        let data = RoomData {
            name: "101".to_string(),
            capacity: 0,
            note: None,
        };
        assert!(data.validate().is_err());
    }
}
