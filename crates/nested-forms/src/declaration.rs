//! Sub-form declarations.
//!
//! A [`NestedFormConfig`] is the form's own [`ModelFormConfig`] plus an
//! ordered list of [`SubFormDeclaration`]s. Each declaration names a
//! relation of the parent model and says how its rows are edited: which
//! child form to use, how many blank rows to offer, whether rows may be
//! deleted, and so on.
//!
//! Most options can depend on the record being edited. They are held as a
//! [`Setting`], either a fixed value or a function resolved when the form
//! is built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nested_forms_db::record::Record;
use nested_forms_db::relation::RelationKind;
use nested_forms_db::value::Value;
use regex::Regex;

use crate::model_form::ModelFormConfig;
use crate::nested::NestedForm;

/// One seeded row: field name to initial value.
pub type InitialRow = BTreeMap<String, Value>;

/// Hook run on a nested form around the loading of its sub-forms.
pub type FormHook = Arc<dyn Fn(&mut NestedForm) + Send + Sync>;

/// A declaration option, fixed or computed from an argument.
///
/// # Examples
///
/// ```
/// use nested_forms::declaration::Setting;
/// use nested_forms_db::record::Record;
///
/// let fixed: Setting<Record, usize> = Setting::Fixed(2);
/// let dynamic: Setting<Record, usize> =
///     Setting::dynamic(|parent: &Record| if parent.is_persisted() { 0 } else { 1 });
///
/// let parent = Record::new("thirdparty");
/// assert_eq!(fixed.resolve(&parent), 2);
/// assert_eq!(dynamic.resolve(&parent), 1);
/// ```
pub enum Setting<A: ?Sized, T> {
    /// A constant value.
    Fixed(T),
    /// A value computed from the argument.
    Dynamic(Arc<dyn Fn(&A) -> T + Send + Sync>),
}

impl<A: ?Sized, T> Setting<A, T> {
    /// Wraps a function.
    pub fn dynamic(f: impl Fn(&A) -> T + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }
}

impl<A: ?Sized, T: Clone> Setting<A, T> {
    /// Returns the value for `arg`.
    pub fn resolve(&self, arg: &A) -> T {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Dynamic(f) => f(arg),
        }
    }
}

impl<A: ?Sized, T: Clone> Clone for Setting<A, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Dynamic(f) => Self::Dynamic(Arc::clone(f)),
        }
    }
}

impl<A: ?Sized, T: fmt::Debug> fmt::Debug for Setting<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// The form used for each row of a sub-form.
#[derive(Debug, Clone)]
pub enum FormFactory {
    /// A plain model form.
    Leaf(Arc<ModelFormConfig>),
    /// A nested form with sub-forms of its own.
    Nested(Arc<NestedFormConfig>),
}

impl FormFactory {
    /// Wraps a model form configuration.
    pub fn leaf(config: ModelFormConfig) -> Self {
        Self::Leaf(Arc::new(config))
    }

    /// Wraps a nested form configuration.
    pub fn nested(config: NestedFormConfig) -> Self {
        Self::Nested(Arc::new(config))
    }

    /// Returns the model the rows edit.
    pub fn model(&self) -> &str {
        match self {
            Self::Leaf(config) => &config.model,
            Self::Nested(config) => config.model(),
        }
    }
}

/// How one relation of the parent is edited as a list of rows.
#[derive(Debug, Clone)]
pub struct SubFormDeclaration {
    /// The relation name on the parent model; also the sub-form prefix.
    pub name: String,
    /// The row form.
    pub form: Setting<Record, FormFactory>,
    /// Blank rows offered when unbound.
    pub extra: Setting<Record, usize>,
    /// Rows seeded when unbound, and written on an update trigger.
    pub initial: Setting<Record, Vec<InitialRow>>,
    /// Whether rows may be deleted.
    pub can_delete: bool,
    /// Submission key that resets the rows to `initial`. Resolved on the
    /// sub-form prefix.
    pub update_button: Option<Setting<str, String>>,
    /// The foreign key on the child that points at the parent, when the
    /// child has several.
    pub fk_name: Option<String>,
    /// Whether a second `TOTAL_FORMS` value asks to duplicate the last row.
    pub duplicate: bool,
    /// Keys not copied by duplication. Resolved on the source row's key
    /// start, `<prefix>-<index>-`.
    pub exclude_from_duplication: Vec<Setting<str, String>>,
    /// Explicit candidate children, replacing the related ones.
    pub queryset: Option<Setting<Record, Vec<Record>>>,
    /// Primary keys a row may reference.
    pub allowed_objects: Option<Setting<Record, Vec<Value>>>,
    /// Minimum number of filled rows.
    pub min_num: usize,
    /// Maximum number of filled rows. Defaults to the configured
    /// `default_max_num_forms`.
    pub max_num: Option<usize>,
    /// Expected relation kind; a mismatch is a configuration error.
    pub kind: Option<RelationKind>,
}

impl SubFormDeclaration {
    /// Declares a sub-form over relation `name`, edited with `form`.
    pub fn new(name: impl Into<String>, form: FormFactory) -> Self {
        Self {
            name: name.into(),
            form: Setting::Fixed(form),
            extra: Setting::Fixed(0),
            initial: Setting::Fixed(Vec::new()),
            can_delete: true,
            update_button: None,
            fk_name: None,
            duplicate: false,
            exclude_from_duplication: Vec::new(),
            queryset: None,
            allowed_objects: None,
            min_num: 0,
            max_num: None,
            kind: None,
        }
    }

    /// Chooses the row form from the parent record.
    #[must_use]
    pub fn form_fn(mut self, f: impl Fn(&Record) -> FormFactory + Send + Sync + 'static) -> Self {
        self.form = Setting::dynamic(f);
        self
    }

    /// Sets the number of blank rows.
    #[must_use]
    pub fn extra(mut self, extra: usize) -> Self {
        self.extra = Setting::Fixed(extra);
        self
    }

    /// Computes the number of blank rows from the parent record.
    #[must_use]
    pub fn extra_fn(mut self, f: impl Fn(&Record) -> usize + Send + Sync + 'static) -> Self {
        self.extra = Setting::dynamic(f);
        self
    }

    /// Sets the seeded rows.
    #[must_use]
    pub fn initial(mut self, rows: Vec<InitialRow>) -> Self {
        self.initial = Setting::Fixed(rows);
        self
    }

    /// Computes the seeded rows from the parent record.
    #[must_use]
    pub fn initial_fn(
        mut self,
        f: impl Fn(&Record) -> Vec<InitialRow> + Send + Sync + 'static,
    ) -> Self {
        self.initial = Setting::dynamic(f);
        self
    }

    /// Sets whether rows may be deleted.
    #[must_use]
    pub fn can_delete(mut self, can_delete: bool) -> Self {
        self.can_delete = can_delete;
        self
    }

    /// Sets the update-trigger key.
    #[must_use]
    pub fn update_button(mut self, key: impl Into<String>) -> Self {
        self.update_button = Some(Setting::Fixed(key.into()));
        self
    }

    /// Computes the update-trigger key from the sub-form prefix.
    #[must_use]
    pub fn update_button_fn(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.update_button = Some(Setting::dynamic(f));
        self
    }

    /// Names the foreign key on the child that points at the parent.
    #[must_use]
    pub fn fk_name(mut self, fk_name: impl Into<String>) -> Self {
        self.fk_name = Some(fk_name.into());
        self
    }

    /// Enables last-row duplication.
    #[must_use]
    pub fn duplicate(mut self, duplicate: bool) -> Self {
        self.duplicate = duplicate;
        self
    }

    /// Adds a duplication exclusion pattern.
    #[must_use]
    pub fn exclude_from_duplication(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_from_duplication
            .push(Setting::Fixed(pattern.into()));
        self
    }

    /// Adds a duplication exclusion pattern computed from the key start of
    /// the row being copied, such as `contacts-1-`.
    #[must_use]
    pub fn exclude_from_duplication_fn(
        mut self,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.exclude_from_duplication.push(Setting::dynamic(f));
        self
    }

    /// Replaces the related children with an explicit candidate list.
    #[must_use]
    pub fn queryset_fn(mut self, f: impl Fn(&Record) -> Vec<Record> + Send + Sync + 'static) -> Self {
        self.queryset = Some(Setting::dynamic(f));
        self
    }

    /// Restricts the children a row may reference.
    #[must_use]
    pub fn allowed_objects(mut self, pks: Vec<Value>) -> Self {
        self.allowed_objects = Some(Setting::Fixed(pks));
        self
    }

    /// Restricts the children a row may reference, from the parent record.
    #[must_use]
    pub fn allowed_objects_fn(
        mut self,
        f: impl Fn(&Record) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        self.allowed_objects = Some(Setting::dynamic(f));
        self
    }

    /// Sets the minimum number of filled rows.
    #[must_use]
    pub const fn min_num(mut self, min_num: usize) -> Self {
        self.min_num = min_num;
        self
    }

    /// Sets the maximum number of filled rows.
    #[must_use]
    pub const fn max_num(mut self, max_num: usize) -> Self {
        self.max_num = Some(max_num);
        self
    }

    /// Declares the expected relation kind.
    #[must_use]
    pub const fn kind(mut self, kind: RelationKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Returns `true` if a submission key matches a duplication exclusion
/// pattern. A pattern ending in `-` is a literal prefix; anything else is a
/// regular expression anchored at the start of the key.
pub fn exclusion_matches(pattern: &str, key: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern.ends_with('-') {
        return key.starts_with(pattern);
    }
    match Regex::new(&format!("^(?:{pattern})")) {
        Ok(re) => re.is_match(key),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid exclusion pattern, matching as prefix");
            key.starts_with(pattern)
        }
    }
}

/// A nested form: the parent's own fields plus its sub-forms.
///
/// # Examples
///
/// ```
/// use nested_forms::declaration::{FormFactory, NestedFormConfig, SubFormDeclaration};
/// use nested_forms::model_form::ModelFormConfig;
///
/// let config = NestedFormConfig::new(ModelFormConfig::new("thirdparty"))
///     .sub_form(
///         SubFormDeclaration::new("contacts", FormFactory::leaf(ModelFormConfig::new("contact")))
///             .extra(1),
///     );
/// assert_eq!(config.order(), vec!["contacts"]);
/// ```
#[derive(Clone)]
pub struct NestedFormConfig {
    /// The parent's own form.
    pub form: ModelFormConfig,
    /// Sub-forms in declaration order.
    pub sub_forms: Vec<SubFormDeclaration>,
    /// Explicit processing order, by name.
    pub order: Option<Vec<String>>,
    /// Hook run before the sub-forms are loaded.
    pub pre_load: Option<FormHook>,
    /// Hook run once the sub-forms are loaded.
    pub on_loaded: Option<FormHook>,
}

impl fmt::Debug for NestedFormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedFormConfig")
            .field("form", &self.form)
            .field("sub_forms", &self.sub_forms)
            .field("order", &self.order)
            .field("pre_load", &self.pre_load.is_some())
            .field("on_loaded", &self.on_loaded.is_some())
            .finish()
    }
}

impl NestedFormConfig {
    /// Creates a configuration with no sub-forms.
    pub const fn new(form: ModelFormConfig) -> Self {
        Self {
            form,
            sub_forms: Vec::new(),
            order: None,
            pre_load: None,
            on_loaded: None,
        }
    }

    /// Adds a sub-form declaration.
    #[must_use]
    pub fn sub_form(mut self, declaration: SubFormDeclaration) -> Self {
        self.sub_forms.push(declaration);
        self
    }

    /// Sets an explicit processing order.
    #[must_use]
    pub fn with_order<S: Into<String>>(mut self, order: impl IntoIterator<Item = S>) -> Self {
        self.order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    /// Installs the hook run before each load of the sub-forms. The parent
    /// form is already bound when it runs, and the groups are not yet built.
    #[must_use]
    pub fn with_pre_load(mut self, hook: impl Fn(&mut NestedForm) + Send + Sync + 'static) -> Self {
        self.pre_load = Some(Arc::new(hook));
        self
    }

    /// Installs the loaded hook.
    #[must_use]
    pub fn with_on_loaded(mut self, hook: impl Fn(&mut NestedForm) + Send + Sync + 'static) -> Self {
        self.on_loaded = Some(Arc::new(hook));
        self
    }

    /// Returns the parent model name.
    pub fn model(&self) -> &str {
        &self.form.model
    }

    /// Looks up a declaration by name.
    pub fn declaration(&self, name: &str) -> Option<&SubFormDeclaration> {
        self.sub_forms.iter().find(|d| d.name == name)
    }

    /// Returns the names in processing order: the explicit order when
    /// set, otherwise declaration order.
    pub fn order(&self) -> Vec<&str> {
        self.order.as_ref().map_or_else(
            || self.sub_forms.iter().map(|d| d.name.as_str()).collect(),
            |order| order.iter().map(String::as_str).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_form() -> FormFactory {
        FormFactory::leaf(ModelFormConfig::new("contact"))
    }

    #[test]
    fn test_declaration_defaults() {
        let decl = SubFormDeclaration::new("contacts", contact_form());
        let parent = Record::new("thirdparty");
        assert_eq!(decl.extra.resolve(&parent), 0);
        assert!(decl.initial.resolve(&parent).is_empty());
        assert!(decl.can_delete);
        assert!(!decl.duplicate);
        assert!(decl.update_button.is_none());
        assert_eq!(decl.form.resolve(&parent).model(), "contact");
    }

    #[test]
    fn test_dynamic_settings_see_parent() {
        let decl = SubFormDeclaration::new("contacts", contact_form())
            .extra_fn(|parent| usize::from(!parent.is_persisted()))
            .update_button_fn(|prefix| format!("{prefix}-update"));
        assert_eq!(decl.extra.resolve(&Record::new("thirdparty")), 1);
        assert_eq!(decl.extra.resolve(&Record::new("thirdparty").with_pk(1)), 0);
        let key = decl.update_button.as_ref().map(|s| s.resolve("contacts"));
        assert_eq!(key.as_deref(), Some("contacts-update"));
    }

    #[test]
    fn test_exclusion_patterns() {
        assert!(exclusion_matches("contacts-0-photo-", "contacts-0-photo-clear"));
        assert!(!exclusion_matches("contacts-0-photo-", "contacts-0-photo"));
        assert!(exclusion_matches(r"contacts-\d+-photo", "contacts-3-photo"));
        assert!(!exclusion_matches(r"\d+-photo", "contacts-3-photo"));
        assert!(exclusion_matches("bad[", "bad[key"));
        assert!(!exclusion_matches("", "anything"));
    }

    #[test]
    fn test_config_order() {
        let config = NestedFormConfig::new(ModelFormConfig::new("thirdparty"))
            .sub_form(SubFormDeclaration::new("contacts", contact_form()))
            .sub_form(SubFormDeclaration::new("tags", contact_form()));
        assert_eq!(config.model(), "thirdparty");
        assert_eq!(config.order(), vec!["contacts", "tags"]);
        assert!(config.declaration("tags").is_some());

        let config = config.with_order(["tags", "ghost"]);
        assert_eq!(config.order(), vec!["tags", "ghost"]);
        assert!(config.declaration("ghost").is_none());
    }

    #[test]
    fn test_nested_factory_model() {
        let inner = NestedFormConfig::new(ModelFormConfig::new("contact"));
        assert_eq!(FormFactory::nested(inner).model(), "contact");
    }
}
