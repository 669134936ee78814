//! Record shape configuration
//!
//! The core never looks inside a record on its own. Callers describe how to
//! pull an id, the searchable fields and an optional creation time out of `T`
//! once, at construction, and every component reads records through that.

use std::fmt;
use std::sync::Arc;

use crate::interface::FieldRole;

type TextAccessor<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
type TimestampAccessor<T> = Arc<dyn Fn(&T) -> Option<i64> + Send + Sync>;

/// A named searchable field bound to a scoring role
pub struct SearchField<T> {
    name: String,
    role: FieldRole,
    accessor: TextAccessor<T>,
}

impl<T> SearchField<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> FieldRole {
        self.role
    }

    pub fn extract(&self, record: &T) -> String {
        (self.accessor)(record)
    }
}

impl<T> Clone for SearchField<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            role: self.role,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

/// Field-extraction configuration for records of type `T`.
///
/// ```
/// use chairside::models::FieldExtractor;
///
/// struct Patient { id: u32, name: String, phone: String }
///
/// let fields = FieldExtractor::new(|p: &Patient| p.id.to_string())
///     .primary("name", |p| p.name.clone())
///     .secondary("phone", |p| p.phone.clone());
/// assert_eq!(fields.fields().count(), 2);
/// ```
pub struct FieldExtractor<T> {
    id: TextAccessor<T>,
    fields: [Option<SearchField<T>>; 4],
    created_at: Option<TimestampAccessor<T>>,
}

impl<T> FieldExtractor<T> {
    pub fn new(id: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        Self {
            id: Arc::new(id),
            fields: [None, None, None, None],
            created_at: None,
        }
    }

    /// Bind `role` to a field. A later call for the same role replaces it.
    pub fn field(
        mut self,
        role: FieldRole,
        name: impl Into<String>,
        accessor: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.fields[role.slot()] = Some(SearchField {
            name: name.into(),
            role,
            accessor: Arc::new(accessor),
        });
        self
    }

    pub fn primary(
        self,
        name: impl Into<String>,
        accessor: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.field(FieldRole::Primary, name, accessor)
    }

    pub fn secondary(
        self,
        name: impl Into<String>,
        accessor: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.field(FieldRole::Secondary, name, accessor)
    }

    pub fn tertiary(
        self,
        name: impl Into<String>,
        accessor: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.field(FieldRole::Tertiary, name, accessor)
    }

    pub fn quaternary(
        self,
        name: impl Into<String>,
        accessor: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.field(FieldRole::Quaternary, name, accessor)
    }

    /// Creation timestamp used by `SortBy::Recent`
    pub fn created_at(mut self, accessor: impl Fn(&T) -> Option<i64> + Send + Sync + 'static) -> Self {
        self.created_at = Some(Arc::new(accessor));
        self
    }

    pub fn id_of(&self, record: &T) -> String {
        (self.id)(record)
    }

    pub fn created_at_of(&self, record: &T) -> Option<i64> {
        self.created_at.as_ref().and_then(|f| f(record))
    }

    pub fn field_for(&self, role: FieldRole) -> Option<&SearchField<T>> {
        self.fields[role.slot()].as_ref()
    }

    /// Configured fields in role order
    pub fn fields(&self) -> impl Iterator<Item = &SearchField<T>> {
        self.fields.iter().flatten()
    }
}

impl<T> Clone for FieldExtractor<T> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            fields: self.fields.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldExtractor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<(&str, FieldRole)> = self.fields().map(|sf| (sf.name(), sf.role())).collect();
        f.debug_struct("FieldExtractor")
            .field("fields", &names)
            .field("has_created_at", &self.created_at.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: u8,
        name: &'static str,
        email: &'static str,
        created: Option<i64>,
    }

    fn extractor() -> FieldExtractor<Row> {
        FieldExtractor::new(|r: &Row| format!("row-{}", r.id))
            .primary("name", |r| r.name.to_string())
            .tertiary("email", |r| r.email.to_string())
            .created_at(|r| r.created)
    }

    #[test]
    fn test_fields_iterate_in_role_order() {
        let fx = extractor().secondary("phone", |_| "0790000000".to_string());
        let names: Vec<&str> = fx.fields().map(|f| f.name()).collect();
        assert_eq!(names, vec!["name", "phone", "email"]);
    }

    #[test]
    fn test_same_role_replaces_previous_binding() {
        let fx = extractor().primary("full_name", |r| r.name.to_uppercase());
        let row = Row { id: 1, name: "Sara", email: "", created: None };
        let primary = fx.field_for(FieldRole::Primary).unwrap();
        assert_eq!(primary.name(), "full_name");
        assert_eq!(primary.extract(&row), "SARA");
        assert_eq!(fx.fields().count(), 2);
    }

    #[test]
    fn test_accessors() {
        let fx = extractor();
        let row = Row { id: 7, name: "Omar", email: "o@example.com", created: Some(42) };
        assert_eq!(fx.id_of(&row), "row-7");
        assert_eq!(fx.created_at_of(&row), Some(42));

        let no_clock = FieldExtractor::new(|r: &Row| r.id.to_string());
        assert_eq!(no_clock.created_at_of(&row), None);
    }
}
