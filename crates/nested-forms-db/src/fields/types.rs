//! Field type definitions for record models.
//!
//! Each [`FieldType`] variant corresponds to a Django model field type, and
//! [`FieldDef`] captures all metadata about a single model field. Relational
//! variants carry what the engine needs to walk from a parent record to its
//! children: the target model and the reverse name a sub-form is declared
//! under.

use crate::validators::Validator;
use crate::value::Value;

/// The type of a model field.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Fixed-precision decimal number.
    DecimalField {
        /// Maximum total digits.
        max_digits: u32,
        /// Digits after the decimal point.
        decimal_places: u32,
    },
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Time without date.
    TimeField,
    /// UUID field.
    UuidField,
    /// JSON data.
    JsonField,
    /// Email address (CharField with email validation).
    EmailField,
    /// URL (CharField with URL validation).
    UrlField,
    /// Slug (URL-friendly string).
    SlugField,
    /// An uploaded file; the record stores the file name.
    FileField,
    /// Many-to-one relationship.
    ForeignKey {
        /// The target model name.
        to: String,
        /// Behavior when the referenced object is deleted.
        on_delete: OnDelete,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
    /// Many-to-many relationship.
    ManyToManyField {
        /// The target model name.
        to: String,
        /// The name used for the reverse relation.
        related_name: Option<String>,
    },
    /// Reverse side of a generic foreign key: children of `to` point back
    /// at the owner through a content type and an object id.
    GenericRelation {
        /// The child model name.
        to: String,
        /// Field on the child holding the owner's model label.
        content_type_field: String,
        /// Field on the child holding the owner's primary key.
        object_id_field: String,
    },
}

/// Behavior when a referenced object is deleted (ON DELETE action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OnDelete {
    /// Delete all related objects (CASCADE).
    Cascade,
    /// Prevent deletion if related objects exist (PROTECT).
    Protect,
    /// Set the foreign key to NULL.
    SetNull,
    /// Take no action.
    DoNothing,
}

/// Complete definition of a model field, including metadata and constraints.
#[derive(Debug)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: &'static str,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Whether the field may be left blank in forms.
    pub blank: bool,
    /// Default value for new instances.
    pub default: Option<Value>,
    /// Maximum character length (for CharField and similar).
    pub max_length: Option<usize>,
    /// Human-readable help text.
    pub help_text: String,
    /// Human-readable name for the field.
    pub verbose_name: String,
    /// Allowed values as (value, display_label) pairs.
    pub choices: Option<Vec<(Value, String)>>,
    /// Validators applied during model validation.
    pub validators: Vec<Box<dyn Validator>>,
    /// Whether the field is editable in forms.
    pub editable: bool,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    ///
    /// Only the field name and type are required. All other attributes take
    /// their default values (non-null, required, editable).
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            primary_key: false,
            null: false,
            blank: false,
            default: None,
            max_length: None,
            help_text: String::new(),
            verbose_name: name.replace('_', " "),
            choices: None,
            validators: Vec::new(),
            editable: true,
        }
    }

    /// Creates a foreign key field with `on_delete = Cascade`.
    pub fn foreign_key(name: &'static str, to: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldType::ForeignKey {
                to: to.into(),
                on_delete: OnDelete::Cascade,
                related_name: None,
            },
        )
    }

    /// Marks this field as the primary key. Primary keys are not editable.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.editable = false;
        self.blank = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Allows the field to be left blank in forms.
    #[must_use]
    pub const fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Hides the field from forms.
    #[must_use]
    pub const fn not_editable(mut self) -> Self {
        self.editable = false;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the verbose (human-readable) name.
    #[must_use]
    pub fn verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = name.into();
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Restricts the field to the given choices.
    #[must_use]
    pub fn choices(mut self, choices: Vec<(Value, String)>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Sets the reverse name of a relational field.
    ///
    /// Has no effect on non-relational fields and generic relations.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        match &mut self.field_type {
            FieldType::ForeignKey { related_name, .. }
            | FieldType::ManyToManyField { related_name, .. } => {
                *related_name = Some(name.into());
            }
            _ => {}
        }
        self
    }

    /// Attaches a validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Returns `true` if this field represents a relational field.
    pub const fn is_relation(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::ForeignKey { .. }
                | FieldType::ManyToManyField { .. }
                | FieldType::GenericRelation { .. }
        )
    }

    /// Returns `true` if the value of this field is stored on the record
    /// itself (many-to-many links and generic relations are not).
    pub const fn is_concrete(&self) -> bool {
        !matches!(
            self.field_type,
            FieldType::ManyToManyField { .. } | FieldType::GenericRelation { .. }
        )
    }

    /// Returns the model this field points at, for relational fields.
    pub fn related_model(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { to, .. }
            | FieldType::ManyToManyField { to, .. }
            | FieldType::GenericRelation { to, .. } => Some(to),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::MaxLengthValidator;

    #[test]
    fn test_field_def_new_defaults() {
        let f = FieldDef::new("first_name", FieldType::CharField);
        assert_eq!(f.name, "first_name");
        assert!(!f.primary_key);
        assert!(!f.null);
        assert!(!f.blank);
        assert!(f.default.is_none());
        assert!(f.max_length.is_none());
        assert!(f.editable);
        assert_eq!(f.verbose_name, "first name");
    }

    #[test]
    fn test_field_def_builder() {
        let f = FieldDef::new("email", FieldType::EmailField)
            .max_length(254)
            .blank()
            .verbose_name("Email Address")
            .help_text("Enter a valid email")
            .validator(MaxLengthValidator::new(254));
        assert_eq!(f.max_length, Some(254));
        assert!(f.blank);
        assert_eq!(f.verbose_name, "Email Address");
        assert_eq!(f.help_text, "Enter a valid email");
        assert_eq!(f.validators.len(), 1);
    }

    #[test]
    fn test_primary_key_is_not_editable() {
        let f = FieldDef::new("id", FieldType::BigAutoField).primary_key();
        assert!(f.primary_key);
        assert!(!f.editable);
    }

    #[test]
    fn test_foreign_key_related_name() {
        let fk = FieldDef::foreign_key("owner", "thirdparty").related_name("contacts");
        assert!(fk.is_relation());
        assert!(fk.is_concrete());
        assert_eq!(fk.related_model(), Some("thirdparty"));
        match fk.field_type {
            FieldType::ForeignKey { related_name, on_delete, .. } => {
                assert_eq!(related_name.as_deref(), Some("contacts"));
                assert_eq!(on_delete, OnDelete::Cascade);
            }
            other => panic!("expected ForeignKey, got {other:?}"),
        }
    }

    #[test]
    fn test_m2m_and_generic_are_not_concrete() {
        let m2m = FieldDef::new(
            "tags",
            FieldType::ManyToManyField {
                to: "tag".into(),
                related_name: None,
            },
        );
        assert!(m2m.is_relation());
        assert!(!m2m.is_concrete());

        let generic = FieldDef::new(
            "notes",
            FieldType::GenericRelation {
                to: "note".into(),
                content_type_field: "content_type".into(),
                object_id_field: "object_id".into(),
            },
        );
        assert!(!generic.is_concrete());
        assert_eq!(generic.related_model(), Some("note"));
    }

    #[test]
    fn test_related_name_ignored_on_plain_field() {
        let f = FieldDef::new("title", FieldType::CharField).related_name("x");
        assert_eq!(f.field_type, FieldType::CharField);
        assert!(!f.is_relation());
        assert_eq!(f.related_model(), None);
    }
}
