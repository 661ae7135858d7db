use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::{
    core::{
        config::CsvConfig,
        path::{ColumnPath, PathStyle, Segment},
    },
    error::{CsvError, Result},
};

/// The ordered columns shared by every row of one session.
///
/// While open, [`HeaderRegistry::resolve`] appends unseen paths. Once
/// [`HeaderRegistry::freeze`] is called the column set is fixed and an unseen
/// path is a [`CsvError::SchemaMismatch`], since the header line may already
/// have been written.
#[derive(Debug, Clone)]
pub struct HeaderRegistry {
    style: PathStyle,
    columns: Vec<ColumnPath>,
    names: Vec<String>,
    positions: HashMap<ColumnPath, usize>,
    by_name: HashMap<String, usize>,
    frozen: bool,
}

impl HeaderRegistry {
    pub fn new(config: &CsvConfig) -> Self {
        Self {
            style: PathStyle::from(config),
            columns: Vec::new(),
            names: Vec::new(),
            positions: HashMap::new(),
            by_name: HashMap::new(),
            frozen: false,
        }
    }

    /// Builds a frozen header from column names, e.g. a header line.
    pub fn from_names<I, S>(names: I, config: &CsvConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = HeaderRegistry::new(config);
        for name in names {
            let name = name.as_ref();
            if registry.by_name.contains_key(name) {
                return Err(CsvError::SchemaMismatch(format!(
                    "duplicate header column '{name}'"
                )));
            }
            let path = ColumnPath::parse(name, &registry.style);
            if registry.positions.contains_key(&path) {
                return Err(CsvError::SchemaMismatch(format!(
                    "header column '{name}' repeats an earlier column"
                )));
            }
            registry.push(path, name.to_string());
        }
        registry.freeze();
        Ok(registry)
    }

    /// Builds a frozen header from column paths.
    pub fn from_paths<I>(paths: I, config: &CsvConfig) -> Result<Self>
    where
        I: IntoIterator<Item = ColumnPath>,
    {
        let mut registry = HeaderRegistry::new(config);
        for path in paths {
            if registry.positions.contains_key(&path) {
                return Err(CsvError::SchemaMismatch(format!(
                    "column '{}' appears twice",
                    path.render(&registry.style)
                )));
            }
            registry.resolve(&path)?;
        }
        registry.freeze();
        Ok(registry)
    }

    fn push(&mut self, path: ColumnPath, name: String) -> usize {
        let index = self.columns.len();
        self.positions.insert(path.clone(), index);
        self.by_name.insert(name.clone(), index);
        self.columns.push(path);
        self.names.push(name);
        index
    }

    /// Returns the position of `path`, registering it while the header is open.
    pub fn resolve(&mut self, path: &ColumnPath) -> Result<usize> {
        if let Some(&index) = self.positions.get(path) {
            return Ok(index);
        }

        let name = path.render(&self.style);
        if self.frozen {
            return Err(CsvError::SchemaMismatch(format!(
                "column '{name}' is not part of the header"
            )));
        }
        if path.is_empty() {
            return Err(CsvError::Unsupported(
                "a scalar cannot be written outside of a record".to_string(),
            ));
        }
        if let Some(&existing) = self.by_name.get(&name) {
            return Err(CsvError::Configuration(format!(
                "two different fields render to the column name '{}' ({:?} and {:?}); \
                 change the path separator or rename one of them",
                name,
                self.columns[existing].segments(),
                path.segments()
            )));
        }
        if let Some(Segment::Field(key)) = path
            .segments()
            .iter()
            .find(|segment| segment.reads_as_index(&self.style))
        {
            return Err(CsvError::Configuration(format!(
                "field or map key '{key}' in column '{name}' would read back as a collection index; \
                 switch the index notation or change the key"
            )));
        }

        Ok(self.push(path.clone(), name))
    }

    /// Drops columns registered after `len`, undoing a failed first record.
    pub(crate) fn truncate(&mut self, len: usize) {
        if self.frozen {
            return;
        }
        for (path, name) in self.columns.drain(len..).zip(self.names.drain(len..)) {
            self.positions.remove(&path);
            self.by_name.remove(&name);
        }
    }

    pub fn freeze(&mut self) {
        if !self.frozen {
            debug!("Header frozen with {} column(s): {:?}", self.len(), self.names);
        }
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, path: &ColumnPath) -> Option<usize> {
        self.positions.get(path).copied()
    }

    /// Maps a column position back to the path of the field it fills.
    pub fn lookup(&self, index: usize) -> Option<&ColumnPath> {
        self.columns.get(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[ColumnPath] {
        &self.columns
    }

    pub fn style(&self) -> &PathStyle {
        &self.style
    }

    /// True when some column lies strictly below `prefix`.
    pub fn has_descendants(&self, prefix: &ColumnPath) -> bool {
        self.columns
            .iter()
            .any(|column| column.len() > prefix.len() && column.starts_with(prefix))
    }

    /// Groups the columns by common prefix into the tree the decoder walks.
    pub fn shape(&self) -> Result<Shape> {
        let Some(first) = self.columns.first() else {
            return Ok(Shape::Record(Vec::new()));
        };
        let mut root = match first.segments().first() {
            Some(Segment::Index(_)) => Shape::Collection(BTreeMap::new()),
            _ => Shape::Record(Vec::new()),
        };

        for (column, path) in self.columns.iter().enumerate() {
            if path.is_empty() {
                return Err(CsvError::SchemaMismatch(
                    "header contains an empty column name".to_string(),
                ));
            }
            insert(&mut root, path.segments(), column).map_err(|reason| {
                CsvError::SchemaMismatch(format!("column '{}' {}", self.names[column], reason))
            })?;
        }
        Ok(root)
    }
}

/// The header as a tree: records, collections and the columns at their leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// A scalar cell, by column position.
    Leaf(usize),
    /// Named members in header order.
    Record(Vec<(String, Shape)>),
    /// Elements by index.
    Collection(BTreeMap<usize, Shape>),
}

impl Shape {
    /// Visits every column position below this node.
    pub fn for_each_leaf<F: FnMut(usize)>(&self, f: &mut F) {
        match self {
            Shape::Leaf(column) => f(*column),
            Shape::Record(children) => children.iter().for_each(|(_, child)| child.for_each_leaf(f)),
            Shape::Collection(elements) => elements.values().for_each(|child| child.for_each_leaf(f)),
        }
    }

    /// True when `predicate` holds for every column below this node.
    pub fn all_leaves<F: Fn(usize) -> bool>(&self, predicate: &F) -> bool {
        match self {
            Shape::Leaf(column) => predicate(*column),
            Shape::Record(children) => children.iter().all(|(_, child)| child.all_leaves(predicate)),
            Shape::Collection(elements) => elements.values().all(|child| child.all_leaves(predicate)),
        }
    }
}

fn template(rest: &[Segment], column: usize) -> Shape {
    match rest.first() {
        None => Shape::Leaf(column),
        Some(Segment::Field(_)) => Shape::Record(Vec::new()),
        Some(Segment::Index(_)) => Shape::Collection(BTreeMap::new()),
    }
}

fn insert(node: &mut Shape, segments: &[Segment], column: usize) -> std::result::Result<(), String> {
    let Some((head, rest)) = segments.split_first() else {
        return Err("is nested under another column".to_string());
    };

    let child = match (node, head) {
        (Shape::Record(children), Segment::Field(name)) => {
            match children.iter().position(|(existing, _)| existing == name) {
                Some(position) => &mut children[position].1,
                None => {
                    children.push((name.clone(), template(rest, column)));
                    if rest.is_empty() {
                        return Ok(());
                    }
                    let last = children.len() - 1;
                    &mut children[last].1
                }
            }
        }
        (Shape::Collection(elements), Segment::Index(index)) => {
            if !elements.contains_key(index) {
                elements.insert(*index, template(rest, column));
                if rest.is_empty() {
                    return Ok(());
                }
            }
            match elements.get_mut(index) {
                Some(child) => child,
                None => return Err("could not be placed".to_string()),
            }
        }
        (Shape::Leaf(_), _) => return Err("is nested under a scalar column".to_string()),
        (Shape::Record(_), Segment::Index(_)) => {
            return Err("mixes a collection index with record fields".to_string());
        }
        (Shape::Collection(_), Segment::Field(_)) => {
            return Err("mixes a record field with collection indices".to_string());
        }
    };

    if rest.is_empty() {
        return Err("repeats or encloses another column".to_string());
    }
    insert(child, rest, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexNotation;

    fn path(name: &str) -> ColumnPath {
        ColumnPath::parse(name, &PathStyle::default())
    }

    #[test]
    fn resolve_appends_until_frozen() {
        let mut registry = HeaderRegistry::new(&CsvConfig::default());

        assert_eq!(registry.resolve(&path("a")).unwrap(), 0);
        assert_eq!(registry.resolve(&path("b.c")).unwrap(), 1);
        assert_eq!(registry.resolve(&path("a")).unwrap(), 0);

        registry.freeze();
        assert_eq!(registry.resolve(&path("b.c")).unwrap(), 1);
        assert!(matches!(
            registry.resolve(&path("b.d")),
            Err(CsvError::SchemaMismatch(_))
        ));
        assert_eq!(registry.names(), ["a", "b.c"]);
    }

    #[test]
    fn lookup_is_the_reverse_of_resolve() {
        let mut registry = HeaderRegistry::new(&CsvConfig::default());
        let column = path("tags[1]");
        let index = registry.resolve(&column).unwrap();

        assert_eq!(registry.lookup(index), Some(&column));
        assert_eq!(registry.name(index), Some("tags[1]"));
        assert_eq!(registry.lookup(7), None);
    }

    #[test]
    fn rendering_collision_is_a_configuration_error() {
        let mut registry = HeaderRegistry::new(&CsvConfig::default());
        let nested = ColumnPath::new(vec![
            Segment::Field("a".to_string()),
            Segment::Field("b".to_string()),
        ]);
        let dotted = ColumnPath::new(vec![Segment::Field("a.b".to_string())]);

        registry.resolve(&nested).unwrap();
        assert!(matches!(
            registry.resolve(&dotted),
            Err(CsvError::Configuration(_))
        ));
    }

    #[test]
    fn index_like_map_keys_are_rejected() {
        let by_count = CsvConfig {
            index_notation: IndexNotation::FlattenByCount,
            ..CsvConfig::default()
        };
        let mut registry = HeaderRegistry::new(&by_count);
        let numeric_key = ColumnPath::new(vec![
            Segment::Field("scores".to_string()),
            Segment::Field("1".to_string()),
        ]);
        assert!(matches!(
            registry.resolve(&numeric_key),
            Err(CsvError::Configuration(_))
        ));
        assert!(registry.is_empty());

        let mut registry = HeaderRegistry::new(&CsvConfig::default());
        let bracketed_key = ColumnPath::new(vec![
            Segment::Field("scores".to_string()),
            Segment::Field("k[0]".to_string()),
        ]);
        assert!(matches!(
            registry.resolve(&bracketed_key),
            Err(CsvError::Configuration(_))
        ));
        assert_eq!(registry.resolve(&numeric_key).unwrap(), 0);
        assert_eq!(registry.names(), ["scores.1"]);
    }

    #[test]
    fn truncate_undoes_an_open_header() {
        let mut registry = HeaderRegistry::new(&CsvConfig::default());
        registry.resolve(&path("a")).unwrap();
        registry.resolve(&path("b")).unwrap();

        registry.truncate(1);
        assert_eq!(registry.names(), ["a"]);
        assert_eq!(registry.position(&path("b")), None);
        assert_eq!(registry.resolve(&path("c")).unwrap(), 1);
    }

    #[test]
    fn from_names_rejects_duplicates() {
        let config = CsvConfig::default();
        assert!(matches!(
            HeaderRegistry::from_names(["a", "b", "a"], &config),
            Err(CsvError::SchemaMismatch(_))
        ));
        assert!(matches!(
            HeaderRegistry::from_names(["t[0]", "t[00]"], &config),
            Err(CsvError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn from_names_uses_configured_notation() {
        let config = CsvConfig {
            index_notation: IndexNotation::FlattenByCount,
            ..CsvConfig::default()
        };
        let registry = HeaderRegistry::from_names(["tags.1", "tags.2"], &config).unwrap();

        assert!(registry.is_frozen());
        assert_eq!(
            registry.lookup(1).unwrap().segments(),
            [Segment::Field("tags".to_string()), Segment::Index(1)]
        );
    }

    #[test]
    fn shape_groups_columns_by_prefix() {
        let registry = HeaderRegistry::from_names(
            ["a", "b.c", "b.d", "tags[0]", "tags[1]"],
            &CsvConfig::default(),
        )
        .unwrap();

        let expected = Shape::Record(vec![
            ("a".to_string(), Shape::Leaf(0)),
            (
                "b".to_string(),
                Shape::Record(vec![
                    ("c".to_string(), Shape::Leaf(1)),
                    ("d".to_string(), Shape::Leaf(2)),
                ]),
            ),
            (
                "tags".to_string(),
                Shape::Collection(BTreeMap::from([(0, Shape::Leaf(3)), (1, Shape::Leaf(4))])),
            ),
        ]);
        assert_eq!(registry.shape().unwrap(), expected);
    }

    #[test]
    fn shape_of_top_level_tuple() {
        let registry = HeaderRegistry::from_names(["[0]", "[1]"], &CsvConfig::default()).unwrap();
        assert_eq!(
            registry.shape().unwrap(),
            Shape::Collection(BTreeMap::from([(0, Shape::Leaf(0)), (1, Shape::Leaf(1))]))
        );
    }

    #[test]
    fn scalar_with_nested_columns_is_a_mismatch() {
        let registry = HeaderRegistry::from_names(["a", "a.b"], &CsvConfig::default()).unwrap();
        assert!(matches!(registry.shape(), Err(CsvError::SchemaMismatch(_))));

        let registry = HeaderRegistry::from_names(["a.b", "a"], &CsvConfig::default()).unwrap();
        assert!(matches!(registry.shape(), Err(CsvError::SchemaMismatch(_))));

        let registry = HeaderRegistry::from_names(["a.b", "a[0]"], &CsvConfig::default()).unwrap();
        assert!(matches!(registry.shape(), Err(CsvError::SchemaMismatch(_))));
    }

    #[test]
    fn descendants() {
        let registry = HeaderRegistry::from_names(["a", "b.c"], &CsvConfig::default()).unwrap();

        assert!(registry.has_descendants(&path("b")));
        assert!(!registry.has_descendants(&path("a")));
        assert!(!registry.has_descendants(&path("b.c")));
    }
}
