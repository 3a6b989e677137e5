//! Resolving sub-form names to relations.
//!
//! A sub-form is declared under the name of a related collection on the
//! parent model: a many-to-many or generic relation field declared on the
//! parent itself, or the reverse side of a foreign key declared on a child
//! model (its `related_name`, or `<child>_set` when none is given).
//! [`resolve_relation`] turns that name into a [`Relation`] that knows how
//! to list, attach, and detach children.

use nested_forms_core::{FormsError, FormsResult};

use crate::fields::FieldType;
use crate::record::Record;
use crate::store::{find, RecordStore};
use crate::value::Value;

/// The kind of relation between a parent and its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RelationKind {
    /// Children carry a foreign key to the parent.
    ForeignKey,
    /// Parent and children are linked through a many-to-many field.
    ManyToMany,
    /// Children point at the parent through content type and object id.
    Generic,
}

/// A resolved relation from a parent model to a child model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Reverse side of a foreign key declared on the child.
    ForeignKey {
        /// Parent model name.
        parent_model: String,
        /// Child model name.
        child_model: String,
        /// The foreign key field on the child.
        fk_field: String,
    },
    /// A many-to-many field declared on the parent.
    ManyToMany {
        /// Parent model name.
        parent_model: String,
        /// Child model name.
        child_model: String,
        /// The many-to-many field on the parent.
        field: String,
    },
    /// A generic relation declared on the parent.
    Generic {
        /// The parent's content type label.
        parent_label: String,
        /// Child model name.
        child_model: String,
        /// Field on the child holding the content type label.
        content_type_field: String,
        /// Field on the child holding the parent's primary key.
        object_id_field: String,
    },
}

impl Relation {
    /// Returns the kind of this relation.
    pub const fn kind(&self) -> RelationKind {
        match self {
            Self::ForeignKey { .. } => RelationKind::ForeignKey,
            Self::ManyToMany { .. } => RelationKind::ManyToMany,
            Self::Generic { .. } => RelationKind::Generic,
        }
    }

    /// Returns the child model name.
    pub fn child_model(&self) -> &str {
        match self {
            Self::ForeignKey { child_model, .. }
            | Self::ManyToMany { child_model, .. }
            | Self::Generic { child_model, .. } => child_model,
        }
    }

    /// Returns the child fields the relation manages. A child form never
    /// exposes them; they are set from the parent on save.
    pub fn managed_fields(&self) -> Vec<&str> {
        match self {
            Self::ForeignKey { fk_field, .. } => vec![fk_field],
            Self::ManyToMany { .. } => Vec::new(),
            Self::Generic {
                content_type_field,
                object_id_field,
                ..
            } => vec![content_type_field, object_id_field],
        }
    }

    /// Lists the children currently related to `parent`. A transient parent
    /// has none.
    pub fn related(&self, store: &dyn RecordStore, parent: &Record) -> FormsResult<Vec<Record>> {
        let Some(pk) = parent.pk() else {
            return Ok(Vec::new());
        };
        match self {
            Self::ForeignKey {
                child_model,
                fk_field,
                ..
            } => store.filter(child_model, &[(fk_field.as_str(), pk.clone())]),
            Self::ManyToMany {
                parent_model,
                child_model,
                field,
            } => {
                let mut children = Vec::new();
                for target in store.linked(parent_model, field, pk)? {
                    if let Some(child) = find(store, child_model, &target)? {
                        children.push(child);
                    }
                }
                Ok(children)
            }
            Self::Generic {
                parent_label,
                child_model,
                content_type_field,
                object_id_field,
            } => store.filter(
                child_model,
                &[
                    (content_type_field.as_str(), Value::from(parent_label.as_str())),
                    (object_id_field.as_str(), pk.clone()),
                ],
            ),
        }
    }

    /// Points a child at its parent before the child is saved. Many-to-many
    /// children are linked separately with [`Relation::link`].
    pub fn attach(&self, child: &mut Record, parent: &Record) {
        let pk = parent.pk().cloned().unwrap_or(Value::Null);
        match self {
            Self::ForeignKey { fk_field, .. } => child.set(fk_field.clone(), pk),
            Self::ManyToMany { .. } => {}
            Self::Generic {
                parent_label,
                content_type_field,
                object_id_field,
                ..
            } => {
                child.set(content_type_field.clone(), parent_label.as_str());
                child.set(object_id_field.clone(), pk);
            }
        }
    }

    /// Replaces the many-to-many links of `parent` with `children`. A no-op
    /// for the other relation kinds.
    pub fn link(
        &self,
        store: &dyn RecordStore,
        parent: &Record,
        children: &[Value],
    ) -> FormsResult<()> {
        match (self, parent.pk()) {
            (
                Self::ManyToMany {
                    parent_model,
                    field,
                    ..
                },
                Some(pk),
            ) => store.set_links(parent_model, field, pk, children),
            _ => Ok(()),
        }
    }

    /// Removes a child no submitted row kept: deleted for foreign-key and
    /// generic children, merely unlinked (by the next [`Relation::link`])
    /// for many-to-many children.
    pub fn discard(&self, store: &dyn RecordStore, child: &Record) -> FormsResult<()> {
        match (self, child.pk()) {
            (Self::ManyToMany { .. }, _) | (_, None) => Ok(()),
            (_, Some(pk)) => store.delete(self.child_model(), pk),
        }
    }

    /// Deletes a child the user asked to drop, whatever the relation kind.
    /// A many-to-many child is unlinked from `parent` before it is deleted.
    pub fn remove(
        &self,
        store: &dyn RecordStore,
        parent: &Record,
        child: &Record,
    ) -> FormsResult<()> {
        let Some(pk) = child.pk() else {
            return Ok(());
        };
        if let (
            Self::ManyToMany {
                parent_model,
                field,
                ..
            },
            Some(parent_pk),
        ) = (self, parent.pk())
        {
            let kept: Vec<Value> = store
                .linked(parent_model, field, parent_pk)?
                .into_iter()
                .filter(|target| target != pk)
                .collect();
            store.set_links(parent_model, field, parent_pk, &kept)?;
        }
        store.delete(self.child_model(), pk)
    }

    /// Returns `true` if `child` currently belongs to `parent`.
    ///
    /// Many-to-many children are shared between parents, so any existing
    /// child counts as owned.
    pub fn owns(&self, child: &Record, parent: &Record) -> bool {
        let Some(pk) = parent.pk() else {
            return false;
        };
        match self {
            Self::ForeignKey { fk_field, .. } => child.get(fk_field) == Some(pk),
            Self::ManyToMany { .. } => child.is_persisted(),
            Self::Generic {
                parent_label,
                content_type_field,
                object_id_field,
                ..
            } => {
                child.get(content_type_field).and_then(Value::as_str) == Some(parent_label.as_str())
                    && child.get(object_id_field) == Some(pk)
            }
        }
    }

    /// Deletes every child of a persisted `parent`, many-to-many children
    /// included.
    pub fn clear(&self, store: &dyn RecordStore, parent: &Record) -> FormsResult<()> {
        for child in self.related(store, parent)? {
            self.remove(store, parent, &child)?;
        }
        self.link(store, parent, &[])
    }
}

/// Resolves the sub-form `name` declared on `parent_model`.
///
/// Resolution order: a many-to-many or generic relation field on the parent
/// with that name, then a foreign key on another model pointing at the
/// parent whose reverse name is `name`. `fk_name` restricts the second step
/// to one foreign key field, which is required when several match.
///
/// # Errors
///
/// Returns [`FormsError::ConfigurationError`] when the name resolves to no
/// relation, or ambiguously to several.
pub fn resolve_relation(
    store: &dyn RecordStore,
    parent_model: &str,
    name: &str,
    fk_name: Option<&str>,
) -> FormsResult<Relation> {
    let parent = store.meta(parent_model)?;

    if let Some(field) = parent.get_field(name) {
        match &field.field_type {
            FieldType::ManyToManyField { to, .. } => {
                return Ok(Relation::ManyToMany {
                    parent_model: parent.model_name.to_string(),
                    child_model: store.meta(to)?.model_name.to_string(),
                    field: name.to_string(),
                });
            }
            FieldType::GenericRelation {
                to,
                content_type_field,
                object_id_field,
            } => {
                return Ok(Relation::Generic {
                    parent_label: parent.label(),
                    child_model: store.meta(to)?.model_name.to_string(),
                    content_type_field: content_type_field.clone(),
                    object_id_field: object_id_field.clone(),
                });
            }
            _ => {}
        }
    }

    let mut matches = Vec::new();
    for meta in store.models() {
        for field in &meta.fields {
            let FieldType::ForeignKey {
                to, related_name, ..
            } = &field.field_type
            else {
                continue;
            };
            if !parent.is_named(to) || fk_name.is_some_and(|n| n != field.name) {
                continue;
            }
            let reverse = related_name
                .clone()
                .unwrap_or_else(|| format!("{}_set", meta.model_name));
            if reverse == name {
                matches.push(Relation::ForeignKey {
                    parent_model: parent.model_name.to_string(),
                    child_model: meta.model_name.to_string(),
                    fk_field: field.name.to_string(),
                });
            }
        }
    }

    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(FormsError::ConfigurationError(format!(
            "'{name}' is not a relation of model '{}'",
            parent.model_name
        ))),
        _ => Err(FormsError::ConfigurationError(format!(
            "'{name}' matches several foreign keys to '{}'; set fk_name",
            parent.model_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldDef;
    use crate::model::ModelMeta;
    use crate::store::testing::MockStore;

    fn store() -> MockStore {
        MockStore::new(vec![
            ModelMeta::new("crm", "thirdparty")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField))
                .field(FieldDef::new(
                    "tags",
                    FieldType::ManyToManyField {
                        to: "tag".into(),
                        related_name: None,
                    },
                ))
                .field(FieldDef::new(
                    "notes",
                    FieldType::GenericRelation {
                        to: "note".into(),
                        content_type_field: "content_type".into(),
                        object_id_field: "object_id".into(),
                    },
                )),
            ModelMeta::new("crm", "contact")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::foreign_key("third_party", "thirdparty").related_name("contacts")),
            ModelMeta::new("crm", "invoice")
                .field(FieldDef::foreign_key("buyer", "thirdparty"))
                .field(FieldDef::foreign_key("seller", "thirdparty")),
            ModelMeta::new("crm", "tag").field(FieldDef::new("label", FieldType::CharField)),
            ModelMeta::new("crm", "note")
                .field(FieldDef::new("content_type", FieldType::CharField))
                .field(FieldDef::new("object_id", FieldType::IntegerField)),
        ])
    }

    #[test]
    fn test_resolve_foreign_key_by_related_name() {
        let rel = resolve_relation(&store(), "thirdparty", "contacts", None).unwrap();
        assert_eq!(rel.kind(), RelationKind::ForeignKey);
        assert_eq!(rel.child_model(), "contact");
        assert_eq!(rel.managed_fields(), vec!["third_party"]);
    }

    #[test]
    fn test_resolve_default_reverse_name_needs_fk_name() {
        let s = store();
        let err = resolve_relation(&s, "thirdparty", "invoice_set", None).unwrap_err();
        assert!(err.to_string().contains("fk_name"));

        let rel = resolve_relation(&s, "thirdparty", "invoice_set", Some("seller")).unwrap();
        assert_eq!(
            rel,
            Relation::ForeignKey {
                parent_model: "thirdparty".into(),
                child_model: "invoice".into(),
                fk_field: "seller".into(),
            }
        );
    }

    #[test]
    fn test_resolve_m2m_and_generic() {
        let s = store();
        let m2m = resolve_relation(&s, "thirdparty", "tags", None).unwrap();
        assert_eq!(m2m.kind(), RelationKind::ManyToMany);
        assert!(m2m.managed_fields().is_empty());

        let generic = resolve_relation(&s, "thirdparty", "notes", None).unwrap();
        assert_eq!(generic.kind(), RelationKind::Generic);
        assert_eq!(generic.child_model(), "note");
    }

    #[test]
    fn test_resolve_unknown_name_is_configuration_error() {
        let err = resolve_relation(&store(), "thirdparty", "phones", None).unwrap_err();
        assert!(matches!(err, FormsError::ConfigurationError(_)));
    }

    #[test]
    fn test_related_and_attach_foreign_key() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "contacts", None).unwrap();
        let mut parent = Record::new("thirdparty");
        assert!(rel.related(&s, &parent).unwrap().is_empty());
        s.save(&mut parent).unwrap();

        let mut child = Record::new("contact");
        rel.attach(&mut child, &parent);
        s.save(&mut child).unwrap();
        s.save(&mut Record::new("contact").with_value("third_party", 99))
            .unwrap();

        let related = rel.related(&s, &parent).unwrap();
        assert_eq!(related.len(), 1);
        assert!(related[0].same_row(&child));

        rel.discard(&s, &child).unwrap();
        assert!(rel.related(&s, &parent).unwrap().is_empty());
    }

    #[test]
    fn test_generic_attach_sets_content_type() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "notes", None).unwrap();
        let parent = Record::new("thirdparty").with_pk(5);
        let mut note = Record::new("note");
        rel.attach(&mut note, &parent);
        assert_eq!(note.get("content_type"), Some(&Value::from("crm.thirdparty")));
        assert_eq!(note.get("object_id"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_m2m_link_and_discard_only_unlinks() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "tags", None).unwrap();
        let mut parent = Record::new("thirdparty");
        s.save(&mut parent).unwrap();
        let mut tag = Record::new("tag").with_value("label", "vip");
        s.save(&mut tag).unwrap();

        rel.link(&s, &parent, &[tag.pk().cloned().unwrap()]).unwrap();
        assert_eq!(rel.related(&s, &parent).unwrap().len(), 1);

        rel.discard(&s, &tag).unwrap();
        assert!(find(&s, "tag", tag.pk().unwrap()).unwrap().is_some());

        rel.link(&s, &parent, &[]).unwrap();
        assert!(rel.related(&s, &parent).unwrap().is_empty());
    }

    #[test]
    fn test_m2m_remove_unlinks_and_deletes() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "tags", None).unwrap();
        let mut parent = Record::new("thirdparty");
        s.save(&mut parent).unwrap();
        let mut vip = Record::new("tag").with_value("label", "vip");
        let mut lead = Record::new("tag").with_value("label", "lead");
        s.save(&mut vip).unwrap();
        s.save(&mut lead).unwrap();
        let pks = [vip.pk().cloned().unwrap(), lead.pk().cloned().unwrap()];
        rel.link(&s, &parent, &pks).unwrap();

        rel.remove(&s, &parent, &vip).unwrap();
        assert!(find(&s, "tag", &pks[0]).unwrap().is_none());
        assert_eq!(
            s.linked("thirdparty", "tags", parent.pk().unwrap()).unwrap(),
            vec![pks[1].clone()]
        );
    }

    #[test]
    fn test_clear_deletes_m2m_children() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "tags", None).unwrap();
        let mut parent = Record::new("thirdparty");
        s.save(&mut parent).unwrap();
        let mut tag = Record::new("tag").with_value("label", "vip");
        s.save(&mut tag).unwrap();
        rel.link(&s, &parent, &[tag.pk().cloned().unwrap()]).unwrap();

        rel.clear(&s, &parent).unwrap();
        assert!(rel.related(&s, &parent).unwrap().is_empty());
        assert!(find(&s, "tag", tag.pk().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_owns_checks_parent_pointer() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "contacts", None).unwrap();
        let parent = Record::new("thirdparty").with_pk(1);
        let mine = Record::new("contact").with_pk(10).with_value("third_party", 1);
        let theirs = Record::new("contact").with_pk(11).with_value("third_party", 2);
        assert!(rel.owns(&mine, &parent));
        assert!(!rel.owns(&theirs, &parent));
        assert!(!rel.owns(&mine, &Record::new("thirdparty")));
    }

    #[test]
    fn test_clear_deletes_foreign_key_children() {
        let s = store();
        let rel = resolve_relation(&s, "thirdparty", "contacts", None).unwrap();
        let mut parent = Record::new("thirdparty");
        s.save(&mut parent).unwrap();
        for _ in 0..2 {
            let mut child = Record::new("contact");
            rel.attach(&mut child, &parent);
            s.save(&mut child).unwrap();
        }
        assert_eq!(rel.related(&s, &parent).unwrap().len(), 2);

        rel.clear(&s, &parent).unwrap();
        assert!(rel.related(&s, &parent).unwrap().is_empty());
    }
}
