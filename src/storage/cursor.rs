//! Cursor options: direction, key range and the visitor verdict

use crate::record::Key;

/// Traversal order of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDirection {
    #[default]
    Next,
    /// Ascending, visiting only the first record of each distinct key
    NextUnique,
    Prev,
    /// Descending keys, visiting only the first record (lowest primary key) of each distinct key
    PrevUnique,
}

impl CursorDirection {
    pub fn is_unique(&self) -> bool {
        matches!(self, CursorDirection::NextUnique | CursorDirection::PrevUnique)
    }

    /// ORDER BY directions for the cursor key and the primary key
    pub(crate) fn order(&self) -> (&'static str, &'static str) {
        match self {
            CursorDirection::Next | CursorDirection::NextUnique => ("ASC", "ASC"),
            CursorDirection::Prev => ("DESC", "DESC"),
            CursorDirection::PrevUnique => ("DESC", "ASC"),
        }
    }
}

/// Bounds on the cursor key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    pub lower: Option<Key>,
    pub upper: Option<Key>,
    pub lower_open: bool,
    pub upper_open: bool,
}

impl KeyRange {
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self::bound(key.clone(), key, false, false)
    }

    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(key.into()),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(key.into()),
            lower_open: false,
            upper_open: open,
        }
    }

    pub fn bound(lower: impl Into<Key>, upper: impl Into<Key>, lower_open: bool, upper_open: bool) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: Some(upper.into()),
            lower_open,
            upper_open,
        }
    }

    /// SQL conditions on `column` with their parameters, in order
    pub(crate) fn conditions(&self, column: &str) -> (Vec<String>, Vec<&Key>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let Some(lower) = &self.lower {
            clauses.push(format!("{} {} ?", column, if self.lower_open { ">" } else { ">=" }));
            params.push(lower);
        }
        if let Some(upper) = &self.upper {
            clauses.push(format!("{} {} ?", column, if self.upper_open { "<" } else { "<=" }));
            params.push(upper);
        }
        (clauses, params)
    }
}

/// What a cursor visitor wants done with the current record.
/// Traversal always moves on to the next record either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Exclude,
}

#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    pub direction: CursorDirection,
    pub range: Option<KeyRange>,
    /// Iterate a secondary index instead of the primary key
    pub index: Option<String>,
}

impl CursorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: CursorDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn range(mut self, range: KeyRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}
