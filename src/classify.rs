use std::fmt::Display;

use crate::{groups::GroupRegistry, source::ProductCode, Transaction};

/// What a row is ranked as: a product group, or a product on its own.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Group(String),
    Product(ProductCode),
}

impl Identity {
    /// The group name or the product code.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Group(name) => name,
            Self::Product(code) => code.as_str(),
        }
    }

    /// The type column of a ranking table: `GROUP`, or the product code.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Group(_) => "GROUP",
            Self::Product(code) => code.as_str(),
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.key())
    }
}

/// A row together with the identity it is ranked under.
#[derive(Clone, Debug, PartialEq)]
pub struct Classified<'a> {
    pub row: &'a Transaction,
    pub identity: Identity,
    /// The group name, or the row's own description for an ungrouped product.
    pub label: &'a str,
}

/// Assigns `row` to its group, or to itself if no group lists its code.
#[must_use]
pub fn classify<'a>(row: &'a Transaction, groups: &'a GroupRegistry) -> Classified<'a> {
    match groups.group_of(&row.code) {
        Some(name) => Classified {
            row,
            identity: Identity::Group(name.to_string()),
            label: name,
        },
        None => Classified {
            row,
            identity: Identity::Product(row.code.clone()),
            label: &row.description,
        },
    }
}
