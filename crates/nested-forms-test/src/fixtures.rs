//! Model metadata for a small CRM schema.
//!
//! ```text
//! thirdparty ──< contact ──< phone
//!     │ tags (many-to-many) ──> tag
//!     │ notes (generic) ──> note(content_type, object_id, attachment)
//! ```
//!
//! A third party has contacts through the reverse foreign key
//! `contacts`, each contact has `phones`. Tags are shared between third
//! parties; notes attach to any record through a content type label and
//! an object id.

use nested_forms_db::fields::{FieldDef, FieldType};
use nested_forms_db::model::ModelMeta;
use nested_forms_db::record::Record;
use nested_forms_db::value::Value;

use crate::test_store::TestStore;

/// The app label of every fixture model.
pub const APP_LABEL: &str = "crm";

/// Returns the CRM models.
pub fn crm_models() -> Vec<ModelMeta> {
    vec![third_party(), contact(), phone(), tag(), note()]
}

/// Returns an empty store over the CRM models.
pub fn crm_store() -> TestStore {
    TestStore::new(crm_models())
}

fn id() -> FieldDef {
    FieldDef::new("id", FieldType::BigAutoField).primary_key()
}

/// A company: `name`, many-to-many `tags`, generic `notes`.
pub fn third_party() -> ModelMeta {
    ModelMeta::new(APP_LABEL, "thirdparty")
        .field(id())
        .field(FieldDef::new("name", FieldType::CharField).max_length(100))
        .field(FieldDef::new(
            "tags",
            FieldType::ManyToManyField {
                to: "tag".into(),
                related_name: Some("third_parties".into()),
            },
        ))
        .field(FieldDef::new(
            "notes",
            FieldType::GenericRelation {
                to: "note".into(),
                content_type_field: "content_type".into(),
                object_id_field: "object_id".into(),
            },
        ))
}

/// A person at a third party: `title` (mr/mrs), `name`.
pub fn contact() -> ModelMeta {
    ModelMeta::new(APP_LABEL, "contact")
        .field(id())
        .field(FieldDef::foreign_key("third_party", "thirdparty").related_name("contacts"))
        .field(
            FieldDef::new("title", FieldType::CharField)
                .max_length(3)
                .choices(vec![
                    (Value::from("mr"), "Mr".to_string()),
                    (Value::from("mrs"), "Mrs".to_string()),
                ]),
        )
        .field(FieldDef::new("name", FieldType::CharField).max_length(100))
        .ordering(vec!["id"])
}

/// A phone number of a contact.
pub fn phone() -> ModelMeta {
    ModelMeta::new(APP_LABEL, "phone")
        .field(id())
        .field(FieldDef::foreign_key("contact", "contact").related_name("phones"))
        .field(FieldDef::new("number", FieldType::CharField).max_length(20))
}

/// A label shared between third parties.
pub fn tag() -> ModelMeta {
    ModelMeta::new(APP_LABEL, "tag")
        .field(id())
        .field(FieldDef::new("label", FieldType::CharField).max_length(30))
}

/// A free-text note attached to any record, with an optional uploaded
/// `attachment`.
pub fn note() -> ModelMeta {
    ModelMeta::new(APP_LABEL, "note")
        .field(id())
        .field(FieldDef::new("content_type", FieldType::CharField).max_length(100))
        .field(FieldDef::new("object_id", FieldType::BigIntegerField))
        .field(FieldDef::new("text", FieldType::TextField))
        .field(FieldDef::new("attachment", FieldType::FileField).blank())
}

/// Inserts a third party.
pub fn insert_third_party(store: &TestStore, name: &str) -> Record {
    store.insert(Record::new("thirdparty").with_value("name", name))
}

/// Inserts a contact of `third_party`.
pub fn insert_contact(store: &TestStore, third_party: &Record, title: &str, name: &str) -> Record {
    store.insert(
        Record::new("contact")
            .with_value("third_party", pk_of(third_party))
            .with_value("title", title)
            .with_value("name", name),
    )
}

/// Inserts a phone of `contact`.
pub fn insert_phone(store: &TestStore, contact: &Record, number: &str) -> Record {
    store.insert(
        Record::new("phone")
            .with_value("contact", pk_of(contact))
            .with_value("number", number),
    )
}

/// Inserts a tag.
pub fn insert_tag(store: &TestStore, label: &str) -> Record {
    store.insert(Record::new("tag").with_value("label", label))
}

/// Inserts a note attached to `owner`.
pub fn insert_note(store: &TestStore, owner: &Record, text: &str) -> Record {
    store.insert(
        Record::new("note")
            .with_value("content_type", format!("{APP_LABEL}.{}", owner.model))
            .with_value("object_id", pk_of(owner))
            .with_value("text", text),
    )
}

fn pk_of(record: &Record) -> Value {
    record.pk().cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nested_forms_db::relation::{resolve_relation, Relation};

    #[test]
    fn test_relations_resolve() {
        let store = crm_store();
        let contacts = resolve_relation(&store, "thirdparty", "contacts", None).unwrap();
        assert_eq!(
            contacts,
            Relation::ForeignKey {
                parent_model: "thirdparty".into(),
                child_model: "contact".into(),
                fk_field: "third_party".into(),
            }
        );
        let phones = resolve_relation(&store, "contact", "phones", None).unwrap();
        assert_eq!(phones.child_model(), "phone");
        let notes = resolve_relation(&store, "thirdparty", "notes", None).unwrap();
        assert!(matches!(notes, Relation::Generic { ref parent_label, .. } if parent_label == "crm.thirdparty"));
    }

    #[test]
    fn test_insert_helpers() {
        let store = crm_store();
        let acme = insert_third_party(&store, "Acme");
        let ann = insert_contact(&store, &acme, "mrs", "Ann");
        insert_phone(&store, &ann, "555");
        insert_note(&store, &acme, "call back");
        assert_eq!(store.count("contact"), 1);
        assert_eq!(store.count("phone"), 1);
        let note = &store.all("note")[0];
        assert_eq!(note.get("content_type"), Some(&Value::from("crm.thirdparty")));
    }
}
