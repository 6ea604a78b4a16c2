// 🏷️ Category Entity - the three classification taxonomies
//
// Every statistic is cross-tabbed by one age group, one sex and one HD-index
// rating. Each taxonomy is its own table keyed by name, and each member is
// either granular ("Male", "0 - 4 years") or an aggregate total ("Both sexes").

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// WELL-KNOWN LABELS
// ============================================================================

pub const ALL_AGES: &str = "All ages";
pub const BOTH_SEXES: &str = "Both sexes";
pub const ALL_HDI_RATINGS: &str = "Human Development Index (HDI) - All ratings";

// ============================================================================
// CATEGORY KIND
// ============================================================================

/// CategoryKind - which taxonomy a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryKind {
    AgeGroup,
    Sex,
    HdIndex,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 3] = [CategoryKind::AgeGroup, CategoryKind::Sex, CategoryKind::HdIndex];

    /// Backing table
    pub fn table(&self) -> &'static str {
        match self {
            CategoryKind::AgeGroup => "age_groups",
            CategoryKind::Sex => "sexes",
            CategoryKind::HdIndex => "hd_indices",
        }
    }

    /// Foreign key column on `demographic_statistics`
    pub fn foreign_key(&self) -> &'static str {
        match self {
            CategoryKind::AgeGroup => "age_group_id",
            CategoryKind::Sex => "sex_id",
            CategoryKind::HdIndex => "hd_index_id",
        }
    }

    /// Field name used at the query boundary (`?age_group=...`)
    pub fn field(&self) -> &'static str {
        match self {
            CategoryKind::AgeGroup => "age_group",
            CategoryKind::Sex => "sex",
            CategoryKind::HdIndex => "hd_index",
        }
    }

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            CategoryKind::AgeGroup => "Age Group",
            CategoryKind::Sex => "Sex",
            CategoryKind::HdIndex => "Human Development Index",
        }
    }

    /// The label of the single total row of this taxonomy
    pub fn aggregate_label(&self) -> &'static str {
        match self {
            CategoryKind::AgeGroup => ALL_AGES,
            CategoryKind::Sex => BOTH_SEXES,
            CategoryKind::HdIndex => ALL_HDI_RATINGS,
        }
    }

    /// Whether a freshly created category with this name is the aggregate member
    pub fn is_aggregate_label(&self, name: &str) -> bool {
        name == self.aggregate_label()
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

/// A persisted member of one taxonomy. `name` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub kind: CategoryKind,
    pub name: String,
    pub is_aggregate: bool,
}

impl Category {
    pub fn new(id: i64, kind: CategoryKind, name: impl Into<String>, is_aggregate: bool) -> Self {
        Category {
            id,
            kind,
            name: name.into(),
            is_aggregate,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// CATEGORY REFERENCE
// ============================================================================

/// A filter argument: either an already resolved category or a name that
/// still has to be looked up (and may not exist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Resolved(Category),
    Named(String),
}

impl From<Category> for CategoryRef {
    fn from(category: Category) -> Self {
        CategoryRef::Resolved(category)
    }
}

impl From<&Category> for CategoryRef {
    fn from(category: &Category) -> Self {
        CategoryRef::Resolved(category.clone())
    }
}

impl From<&str> for CategoryRef {
    fn from(name: &str) -> Self {
        CategoryRef::Named(name.to_string())
    }
}

impl From<String> for CategoryRef {
    fn from(name: String) -> Self {
        CategoryRef::Named(name)
    }
}
