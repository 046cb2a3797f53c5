use tracing::warn;

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use crate::{source::ProductCode, Error, Result};

const BUILTIN_PATH: &str = "data/product_groups";
const BUILTIN: &str = include_str!("../data/product_groups");

#[derive(Debug)]
struct Group {
    name: String,
    codes: Vec<ProductCode>,
}

/// A code listed under more than one group, and which group kept it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub code: ProductCode,
    pub kept: String,
    pub ignored: String,
}

/// Maps product codes to the product groups they are reported under.
///
/// A code belongs to at most one group. If a later group lists a code that an
/// earlier group already claimed, the earlier group keeps it and the clash is
/// recorded (see [`GroupRegistry::conflicts`]).
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: Vec<Group>,
    index: HashMap<ProductCode, usize>,
    conflicts: Vec<Conflict>,
}

impl GroupRegistry {
    /// Creates an empty registry, in which every product stands alone.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads product group configuration from `path`.
    ///
    /// The file has one group per line, in the format:
    ///
    /// ```txt
    /// GROUP NAME | CODE, CODE, ...
    /// ```
    ///
    /// Blank lines, and lines starting with `#`, are ignored.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * The file cannot be opened
    /// * The file cannot be read
    /// * A line has no ` | ` separator, no group name, or no codes
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        Self::from_lines(file.lines(), path)
    }

    /// Returns the group table shipped with the crate, as found in
    /// `data/product_groups`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`GroupRegistry::from_file`] for a bad line.
    pub fn builtin() -> Result<Self> {
        let lines = BUILTIN.lines().map(|line| Ok(line.to_string()));
        Self::from_lines(lines, Path::new(BUILTIN_PATH))
    }

    fn from_lines(lines: impl Iterator<Item = io::Result<String>>, path: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad_line = |reason: &str| Error::BadGroupLine {
                path: path.to_path_buf(),
                line: i + 1,
                reason: format!("{reason}: {line}"),
            };
            let Some((name, codes)) = line.split_once(" | ") else {
                return Err(bad_line("bad line format (missing |)"));
            };
            let codes: Vec<&str> = codes
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            if name.trim().is_empty() {
                return Err(bad_line("missing group name"));
            }
            if codes.is_empty() {
                return Err(bad_line("group has no codes"));
            }
            registry.add_group(name, codes);
        }
        Ok(registry)
    }

    /// Adds the products `codes` to the group `name`.
    ///
    /// Group names are upper-cased. Adding to an existing name extends that
    /// group.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sales_ranking::{GroupRegistry, ProductCode};
    /// let mut groups = GroupRegistry::new();
    /// groups.add_group("Acem", ["1924", "8006"]);
    /// assert_eq!(groups.group_of(&ProductCode::from("8006")), Some("ACEM"));
    /// assert_eq!(groups.group_of(&ProductCode::from("1")), None);
    /// ```
    pub fn add_group<I, C>(&mut self, name: &str, codes: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<ProductCode>,
    {
        let name = name.trim().to_uppercase();
        let slot = match self.groups.iter().position(|g| g.name == name) {
            Some(slot) => slot,
            None => {
                self.groups.push(Group {
                    name,
                    codes: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        for code in codes {
            let code = code.into();
            match self.index.get(&code) {
                Some(&owner) if owner == slot => {}
                Some(&owner) => {
                    let conflict = Conflict {
                        code,
                        kept: self.groups[owner].name.clone(),
                        ignored: self.groups[slot].name.clone(),
                    };
                    warn!(
                        code = %conflict.code,
                        kept = conflict.kept,
                        ignored = conflict.ignored,
                        "product listed in two groups; keeping the first"
                    );
                    self.conflicts.push(conflict);
                }
                None => {
                    self.index.insert(code.clone(), slot);
                    self.groups[slot].codes.push(code);
                }
            }
        }
    }

    /// Returns the name of the group `code` belongs to, if any.
    #[must_use]
    pub fn group_of(&self, code: &ProductCode) -> Option<&str> {
        self.index.get(code).map(|&slot| self.groups[slot].name.as_str())
    }

    /// Returns the codes of group `name`, in the order they were added.
    #[must_use]
    pub fn members(&self, name: &str) -> Option<&[ProductCode]> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.codes.as_slice())
    }

    /// Returns every code that more than one group tried to claim.
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
