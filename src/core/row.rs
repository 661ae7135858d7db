use crate::core::path::ColumnPath;

/// A leaf value, already formatted as text by its `Serialize` impl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Text(String),
    Null,
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl From<&str> for Scalar {
    fn from(text: &str) -> Self {
        Scalar::Text(text.to_string())
    }
}

impl From<String> for Scalar {
    fn from(text: String) -> Self {
        Scalar::Text(text)
    }
}

/// The cells of one record in the order the encoder produced them.
#[derive(Debug, Default)]
pub struct RowBuffer {
    cells: Vec<(ColumnPath, Scalar)>,
}

impl RowBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, path: ColumnPath, value: Scalar) {
        self.cells.push((path, value));
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnPath, &Scalar)> {
        self.cells.iter().map(|(path, value)| (path, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::Segment;

    #[test]
    fn cells_keep_insertion_order() {
        let mut row = RowBuffer::with_capacity(2);
        row.push(ColumnPath::new(vec![Segment::Field("b".into())]), "2".into());
        row.push(ColumnPath::new(vec![Segment::Field("a".into())]), Scalar::Null);

        let cells: Vec<_> = row.iter().collect();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].1, &Scalar::Text("2".to_string()));
        assert!(cells[1].1.is_null());

        row.clear();
        assert!(row.iter().next().is_none());
    }
}
