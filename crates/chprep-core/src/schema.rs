//! Schema resolution: column descriptors and dotted column families.
//!
//! Walks a table's column list in schema order, classifies every column, and groups
//! dotted names (`items.id`, `items.qty`) into families. A family backed by arrays is
//! [`FamilyKind::Nested`] (parallel arrays sharing an index); a family of scalars is
//! [`FamilyKind::Grouped`]. The kind is decided by the first member and never changes.
//!
//! The resolved schema is immutable. Statistics live in a separate table produced
//! by the profiler and keyed by the same entry names.

use chprep_core_common::DescribedColumn;
use indexmap::IndexMap;
use log::{debug, warn};

use crate::classify::{StructuralKind, ValueKind, classify, is_required};
use crate::error::SchemaError;
use crate::type_grammar::TypeNode;

/// Membership of a column in a dotted family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyMembership {
    /// Name prefix before the first dot
    pub parent_name: String,
    /// Remainder after the first dot
    pub child_name: String,
    /// Whether this column opened the family
    pub is_first_of_family: bool,
}

/// One physical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name, possibly dotted
    pub name: String,
    /// Type string as reported by the store
    pub raw_type: String,
    /// Parsed type tree
    pub type_node: TypeNode,
    /// Structural shape; dotted array members are [`StructuralKind::Nested`]
    pub structural_kind: StructuralKind,
    /// Value kind (element kind for arrays, value kind for maps)
    pub value_kind: ValueKind,
    /// Key kind, maps only
    pub key_kind: Option<ValueKind>,
    /// Whether inserts must supply a non-null value
    pub required: bool,
    /// `false` for columns the store computes (`ALIAS`, `MATERIALIZED`)
    pub insertable: bool,
    /// Family relationship, dotted columns only
    pub family: Option<FamilyMembership>,
}

impl ColumnDescriptor {
    /// Path of the column: `[parent, child]` for family members, `[name]` otherwise.
    #[must_use]
    pub fn nested_path(&self) -> Vec<&str> {
        match &self.family {
            Some(family) => vec![family.parent_name.as_str(), family.child_name.as_str()],
            None => vec![self.name.as_str()],
        }
    }

    /// Name within the family, or the full name for top-level columns.
    #[must_use]
    pub fn child_name(&self) -> &str {
        self.family
            .as_ref()
            .map_or(self.name.as_str(), |f| f.child_name.as_str())
    }
}

/// Kind of a dotted family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    /// Parallel arrays of equal length
    Nested,
    /// Independent scalars sharing a prefix
    Grouped,
}

impl FamilyKind {
    /// The structural kind family entries report.
    #[must_use]
    pub fn structural_kind(&self) -> StructuralKind {
        match self {
            FamilyKind::Nested => StructuralKind::Nested,
            FamilyKind::Grouped => StructuralKind::Grouped,
        }
    }
}

/// A dotted family of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFamily {
    /// Shared name prefix
    pub parent_name: String,
    /// Decided from the first member
    pub kind: FamilyKind,
    /// Members in schema order
    pub members: Vec<ColumnDescriptor>,
}

impl ColumnFamily {
    /// Finds a member by its child name.
    #[must_use]
    pub fn member(&self, child_name: &str) -> Option<&ColumnDescriptor> {
        self.members.iter().find(|m| m.child_name() == child_name)
    }
}

/// A top-level schema entry: a plain column or a family root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaEntry {
    /// Basic, Array or Map column without a dot
    Column(ColumnDescriptor),
    /// Nested or Grouped family
    Family(ColumnFamily),
}

impl SchemaEntry {
    /// Entry name: the column name or the family prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SchemaEntry::Column(column) => &column.name,
            SchemaEntry::Family(family) => &family.parent_name,
        }
    }

    /// Structural kind of the entry.
    #[must_use]
    pub fn structural_kind(&self) -> StructuralKind {
        match self {
            SchemaEntry::Column(column) => column.structural_kind,
            SchemaEntry::Family(family) => family.kind.structural_kind(),
        }
    }
}

/// A column left out of the resolved schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedColumn {
    /// Column name
    pub name: String,
    /// Type string as reported by the store
    pub raw_type: String,
    /// Why it was rejected
    pub reason: String,
}

/// Immutable result of schema resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSchema {
    entries: IndexMap<String, SchemaEntry>,
    rejected: Vec<RejectedColumn>,
}

impl ResolvedSchema {
    /// Top-level entries in schema order.
    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.values()
    }

    /// Entries the profiler computes statistics for: plain columns and family roots.
    ///
    /// Family members are never profiled on their own.
    #[must_use]
    pub fn profile_targets(&self) -> Vec<&SchemaEntry> {
        self.entries.values().collect()
    }

    /// Entry names in schema order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Looks up a top-level entry.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Columns that failed classification or collided with another entry.
    #[must_use]
    pub fn rejected(&self) -> &[RejectedColumn] {
        &self.rejected
    }

    /// Finds a descriptor by full column name, family members included.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        if let Some(SchemaEntry::Column(column)) = self.entries.get(name) {
            return Some(column);
        }
        let (parent, _) = name.split_once('.')?;
        match self.entries.get(parent)? {
            SchemaEntry::Family(family) => family.members.iter().find(|m| m.name == name),
            SchemaEntry::Column(_) => None,
        }
    }

    /// All descriptors, family members in place of their family, in schema order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.entries.values().flat_map(|entry| match entry {
            SchemaEntry::Column(column) => std::slice::from_ref(column).iter(),
            SchemaEntry::Family(family) => family.members.iter(),
        })
    }

    /// Families backed by parallel arrays.
    pub fn nested_families(&self) -> impl Iterator<Item = &ColumnFamily> {
        self.entries.values().filter_map(|entry| match entry {
            SchemaEntry::Family(family) if family.kind == FamilyKind::Nested => Some(family),
            _ => None,
        })
    }

    fn reject(&mut self, described: &DescribedColumn, reason: &str) {
        warn!(
            "Skipping column '{}' ({}): {reason}",
            described.name, described.raw_type
        );
        self.rejected.push(RejectedColumn {
            name: described.name.clone(),
            raw_type: described.raw_type.clone(),
            reason: reason.to_string(),
        });
    }
}

/// Resolves a table's column list into descriptors and families.
///
/// A column that fails classification is skipped and recorded in
/// [`ResolvedSchema::rejected`], unless it is the first member of a new family, in
/// which case the family cannot be grouped and resolution aborts.
///
/// # Errors
///
/// Returns [`SchemaError::FamilyRoot`] if the first member of a dotted family
/// cannot be classified.
///
/// # Examples
///
/// ```
/// use chprep_core::classify::StructuralKind;
/// use chprep_core::schema::{SchemaEntry, resolve};
/// use chprep_core_common::DescribedColumn;
///
/// let schema = resolve(&[
///     DescribedColumn::new("event_gid", "UUID"),
///     DescribedColumn::new("items.id", "Array(String)"),
///     DescribedColumn::new("items.qty", "Array(Int32)"),
/// ])
/// .unwrap();
///
/// assert_eq!(schema.len(), 2);
/// assert_eq!(schema.entry("items").unwrap().structural_kind(), StructuralKind::Nested);
/// ```
pub fn resolve(columns: &[DescribedColumn]) -> Result<ResolvedSchema, SchemaError> {
    let mut schema = ResolvedSchema::default();

    for described in columns {
        let classification = classify(&described.name, &described.raw_type);

        let Some((parent, child)) = described.name.split_once('.') else {
            match classification {
                Ok(c) if !schema.entries.contains_key(&described.name) => {
                    let descriptor = ColumnDescriptor {
                        name: described.name.clone(),
                        raw_type: described.raw_type.clone(),
                        required: is_required(&c.node),
                        type_node: c.node,
                        structural_kind: c.structural_kind,
                        value_kind: c.value_kind,
                        key_kind: c.key_kind,
                        insertable: !described.is_computed(),
                        family: None,
                    };
                    schema
                        .entries
                        .insert(described.name.clone(), SchemaEntry::Column(descriptor));
                },
                Ok(_) => schema.reject(described, "name collides with an earlier entry"),
                Err(e) => schema.reject(described, &e.to_string()),
            }
            continue;
        };

        let opens_family = !schema.entries.contains_key(parent);
        let c = match classification {
            Ok(c) => c,
            Err(source) if opens_family => {
                return Err(SchemaError::FamilyRoot {
                    family: parent.to_string(),
                    source,
                });
            },
            Err(e) => {
                schema.reject(described, &e.to_string());
                continue;
            },
        };

        let structural_kind = match c.structural_kind {
            StructuralKind::Array => StructuralKind::Nested,
            other => other,
        };

        if opens_family {
            let kind = if structural_kind == StructuralKind::Nested {
                FamilyKind::Nested
            } else {
                FamilyKind::Grouped
            };
            debug!("New {kind:?} family '{parent}' opened by '{}'", described.name);
            schema.entries.insert(
                parent.to_string(),
                SchemaEntry::Family(ColumnFamily {
                    parent_name: parent.to_string(),
                    kind,
                    members: Vec::new(),
                }),
            );
        }

        let descriptor = ColumnDescriptor {
            name: described.name.clone(),
            raw_type: described.raw_type.clone(),
            required: is_required(&c.node),
            type_node: c.node,
            structural_kind,
            value_kind: c.value_kind,
            key_kind: c.key_kind,
            insertable: !described.is_computed(),
            family: Some(FamilyMembership {
                parent_name: parent.to_string(),
                child_name: child.to_string(),
                is_first_of_family: opens_family,
            }),
        };

        match schema.entries.get_mut(parent) {
            Some(SchemaEntry::Family(family)) => family.members.push(descriptor),
            _ => schema.reject(described, "family prefix collides with a plain column"),
        }
    }

    Ok(schema)
}
