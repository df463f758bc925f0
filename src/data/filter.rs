//! Document filter builders shared by the collection extension traits.
//!
//! UUIDs are stored in their hyphenated string form, matching how serde
//! writes them into documents.

use bson::{doc, Bson, Document};
use uuid::Uuid;

#[inline]
pub fn uuid_bson(id: Uuid) -> Bson {
    Bson::String(id.to_string())
}

#[inline]
pub fn uuid_in(ids: impl IntoIterator<Item = Uuid>) -> Bson {
    Bson::Document(doc! {
        "$in": ids.into_iter().map(uuid_bson).collect::<Vec<_>>()
    })
}

#[inline]
pub fn by_id(id: Uuid) -> Document {
    doc! { "_id": uuid_bson(id) }
}

#[inline]
pub fn by_student(id: Uuid) -> Document {
    doc! { "student_id": uuid_bson(id) }
}

#[inline]
pub fn by_room(id: Uuid) -> Document {
    doc! { "room_id": uuid_bson(id) }
}

/// Reads a UUID value out of a raw document.
pub fn doc_uuid(doc: &Document, key: &str) -> Option<Uuid> {
    match doc.get(key) {
        Some(Bson::String(raw)) => Uuid::parse_str(raw).ok(),
        _ => None,
    }
}
