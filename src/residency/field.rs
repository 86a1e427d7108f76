//! Tri-state descriptor fields

/// One optional field of a descriptor.
///
/// `Unset` leaves the target untouched, `Clear` resets it (to `None` for
/// optional targets, to the field's default otherwise) and `Value` overwrites.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    #[default]
    Unset,
    Clear,
    Value(T),
}

impl<T> Field<T> {
    /// `Some(v)` becomes `Value(v)`, `None` becomes `Clear`.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Clear,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Unset => Field::Unset,
            Field::Clear => Field::Clear,
            Field::Value(v) => Field::Value(f(v)),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Field<U>, E> {
        Ok(match self {
            Field::Unset => Field::Unset,
            Field::Clear => Field::Clear,
            Field::Value(v) => Field::Value(f(v)?),
        })
    }

    /// Merge into a non-nullable target; `Clear` writes `default`.
    pub fn merge_into(self, target: &mut T, default: T) {
        match self {
            Field::Unset => {}
            Field::Clear => *target = default,
            Field::Value(v) => *target = v,
        }
    }

    /// Merge into a nullable target.
    pub fn merge_option(self, target: &mut Option<T>) {
        match self {
            Field::Unset => {}
            Field::Clear => *target = None,
            Field::Value(v) => *target = Some(v),
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}
