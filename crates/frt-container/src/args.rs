//! Kernel argument table

use std::collections::BTreeMap;

/// How an argument is passed to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgCategory {
    /// By-value scalar (`addressQualifier` 0)
    Scalar,

    /// Memory-mapped global buffer (`addressQualifier` 1)
    Mmap,

    /// AXI stream (`addressQualifier` 4)
    Stream,

    /// Unrecognized qualifier; carried for diagnostics only
    Unknown(i64),
}

impl ArgCategory {
    /// Map an `addressQualifier` code.
    pub const fn from_address_qualifier(code: i64) -> Self {
        match code {
            0 => Self::Scalar,
            1 => Self::Mmap,
            4 => Self::Stream,
            other => Self::Unknown(other),
        }
    }

    /// True for memory-mapped buffers
    pub const fn is_buffer(self) -> bool {
        matches!(self, Self::Mmap)
    }
}

impl std::fmt::Display for ArgCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Mmap => write!(f, "mmap"),
            Self::Stream => write!(f, "stream"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Metadata for one kernel argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    /// Position in the flat argument table
    pub index: usize,

    /// Argument name
    pub name: String,

    /// C type as declared in the kernel signature
    pub type_name: String,

    /// Passing convention
    pub category: ArgCategory,

    /// Memory bank tag from the connectivity section, if any
    pub bank_tag: Option<String>,
}

/// Index-keyed argument metadata.
///
/// Filled once while parsing; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgTable {
    args: BTreeMap<usize, ArgInfo>,
}

impl ArgTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an argument. Returns the previous entry with the same index.
    pub(crate) fn insert(&mut self, arg: ArgInfo) -> Option<ArgInfo> {
        self.args.insert(arg.index, arg)
    }

    /// Assign a bank tag. Returns `false` if there is no argument at `index`.
    pub(crate) fn set_bank_tag(&mut self, index: usize, tag: String) -> bool {
        match self.args.get_mut(&index) {
            Some(arg) => {
                arg.bank_tag = Some(tag);
                true
            }
            None => false,
        }
    }

    /// Argument at `index`
    pub fn get(&self, index: usize) -> Option<&ArgInfo> {
        self.args.get(&index)
    }

    /// True if `index` is declared
    pub fn contains(&self, index: usize) -> bool {
        self.args.contains_key(&index)
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True if no arguments were declared
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Arguments in index order
    pub fn iter(&self) -> impl Iterator<Item = &ArgInfo> {
        self.args.values()
    }

    /// Highest declared index
    pub fn max_index(&self) -> Option<usize> {
        self.args.keys().next_back().copied()
    }

    /// Arguments of one category
    pub fn by_category(&self, category: ArgCategory) -> impl Iterator<Item = &ArgInfo> {
        self.iter().filter(move |a| a.category == category)
    }
}

impl<'a> IntoIterator for &'a ArgTable {
    type Item = &'a ArgInfo;
    type IntoIter = std::collections::btree_map::Values<'a, usize, ArgInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.values()
    }
}
