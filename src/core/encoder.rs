//! The root encoder: one instance flattens one whole record.
//!
//! serde hands a fresh serializer to every nested value. Here every compound
//! serializer is the same `&mut RowEncoder`, so nested structs, sequences and
//! maps only push frames and path segments onto the encoder that owns the row.

use log::trace;
use serde::ser::{self, Serialize};

use crate::{
    core::{
        config::{CsvConfig, RaggedCollections},
        header::HeaderRegistry,
        path::{ColumnPath, PathBuilder, Segment},
        quoting::{encode_scalar, join_record},
        row::{RowBuffer, Scalar},
    },
    error::{CsvError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// Nothing has been received yet.
    Idle,
    /// At least one structure or collection is open.
    InProgress,
    /// The top-level structure has been closed; only `finish` remains.
    Complete,
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Record,
    Collection { next: usize, hint: Option<usize> },
}

/// Flattens the structural events of one record into a CSV line.
pub struct RowEncoder<'a> {
    registry: &'a mut HeaderRegistry,
    config: &'a CsvConfig,
    path: PathBuilder,
    row: RowBuffer,
    frames: Vec<Frame>,
    state: EncoderState,
    null_paths: Vec<ColumnPath>,
    collections: Vec<(ColumnPath, usize)>,
    pending_key: Option<String>,
}

impl<'a> RowEncoder<'a> {
    pub(crate) fn new(registry: &'a mut HeaderRegistry, config: &'a CsvConfig) -> Self {
        let capacity = registry.len();
        Self {
            registry,
            config,
            path: PathBuilder::new(),
            row: RowBuffer::with_capacity(capacity),
            frames: Vec::new(),
            state: EncoderState::Idle,
            null_paths: Vec::new(),
            collections: Vec::new(),
            pending_key: None,
        }
    }

    /// Builds a bare encoder outside of an encode session.
    #[cfg(any(test, feature = "tests-cfg"))]
    pub fn for_tests(registry: &'a mut HeaderRegistry, config: &'a CsvConfig) -> Self {
        Self::new(registry, config)
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    fn open(&mut self, frame: Frame) -> Result<()> {
        match self.state {
            EncoderState::Complete => {
                return Err(CsvError::Message(
                    "the record is complete, a new encoder is needed for the next one".to_string(),
                ));
            }
            EncoderState::Idle => self.state = EncoderState::InProgress,
            EncoderState::InProgress => {}
        }
        self.frames.push(frame);
        Ok(())
    }

    fn close(&mut self) -> Result<Frame> {
        let frame = self.frames.pop().ok_or_else(|| {
            CsvError::IncompleteRecord("a structure was closed without being opened".to_string())
        })?;
        if self.frames.is_empty() {
            self.state = EncoderState::Complete;
        }
        Ok(frame)
    }

    pub fn begin_structure(&mut self) -> Result<()> {
        self.open(Frame::Record)
    }

    pub fn end_structure(&mut self) -> Result<()> {
        match self.close()? {
            Frame::Record => Ok(()),
            Frame::Collection { .. } => Err(CsvError::IncompleteRecord(
                "end_structure closed a collection".to_string(),
            )),
        }
    }

    /// Opens a collection; `size_hint` is the element count when known upfront.
    pub fn begin_collection(&mut self, size_hint: Option<usize>) -> Result<()> {
        self.open(Frame::Collection {
            next: 0,
            hint: size_hint,
        })
    }

    pub fn end_collection(&mut self) -> Result<()> {
        match self.close()? {
            Frame::Collection { next, hint } => {
                if hint.is_some_and(|hint| hint != next) {
                    trace!(
                        "Collection at '{}' announced {:?} element(s) but had {}",
                        self.path.current_path(self.registry.style()),
                        hint,
                        next
                    );
                }
                self.collections.push((self.path.current(), next));
                Ok(())
            }
            Frame::Record => Err(CsvError::IncompleteRecord(
                "end_collection closed a structure".to_string(),
            )),
        }
    }

    /// Enters a named member of the current structure.
    pub fn begin_field(&mut self, name: &str) -> Result<()> {
        self.path.enter(Segment::Field(name.to_string()));
        Ok(())
    }

    pub fn end_field(&mut self) -> Result<()> {
        match self.path.exit() {
            Some(Segment::Field(_)) => Ok(()),
            _ => Err(CsvError::IncompleteRecord(
                "end_field without a matching begin_field".to_string(),
            )),
        }
    }

    /// Enters the next element of the innermost collection.
    pub fn begin_element(&mut self) -> Result<()> {
        match self.frames.last_mut() {
            Some(Frame::Collection { next, .. }) => {
                let index = *next;
                *next += 1;
                self.path.enter(Segment::Index(index));
                Ok(())
            }
            _ => Err(CsvError::IncompleteRecord(
                "an element was written outside of a collection".to_string(),
            )),
        }
    }

    pub fn end_element(&mut self) -> Result<()> {
        match self.path.exit() {
            Some(Segment::Index(_)) => Ok(()),
            _ => Err(CsvError::IncompleteRecord(
                "end_element without a matching begin_element".to_string(),
            )),
        }
    }

    /// Stores a leaf at the current path; quoting happens when the row is rendered.
    pub fn encode_scalar(&mut self, value: Scalar) -> Result<()> {
        if self.frames.is_empty() {
            return Err(CsvError::Unsupported(
                "the top-level value must be a struct, map, tuple or sequence".to_string(),
            ));
        }
        let path = self.path.current();
        if value.is_null() {
            self.null_paths.push(path.clone());
        }
        self.row.push(path, value);
        Ok(())
    }

    pub fn encode_null(&mut self) -> Result<()> {
        self.encode_scalar(Scalar::Null)
    }

    /// Checks the row against the header and renders it in header order.
    ///
    /// The first record of a session registers its columns and freezes the
    /// header. If it fails, the header is left as it was.
    pub fn finish(mut self) -> Result<String> {
        match self.state {
            EncoderState::Complete => {}
            EncoderState::Idle => {
                return Err(CsvError::IncompleteRecord(
                    "no record was encoded".to_string(),
                ));
            }
            EncoderState::InProgress => {
                return Err(CsvError::IncompleteRecord(format!(
                    "{} structure(s) or collection(s) still open at '{}'",
                    self.frames.len(),
                    self.path.current_path(self.registry.style())
                )));
            }
        }

        let registered = self.registry.len();
        let slots = match self.place_cells() {
            Ok(slots) => slots,
            Err(error) => {
                self.registry.truncate(registered);
                return Err(error);
            }
        };

        let cells: Vec<&Scalar> = self.row.iter().map(|(_, value)| value).collect();
        let null = Scalar::Null;
        let line = join_record(
            slots.iter().map(|slot| {
                let value = slot.map_or(&null, |i| cells[i]);
                encode_scalar(value, self.config)
            }),
            self.config,
        );

        if !self.registry.is_frozen() {
            self.registry.freeze();
        }
        trace!("Rendered row: {:?}", line);
        Ok(line)
    }

    /// Maps every header column to the row cell that fills it, if any.
    fn place_cells(&mut self) -> Result<Vec<Option<usize>>> {
        let frozen = self.registry.is_frozen();
        let mut slots: Vec<Option<usize>> = vec![None; self.registry.len()];

        for (i, (path, value)) in self.row.iter().enumerate() {
            let column = if frozen {
                match self.registry.position(path) {
                    Some(column) => column,
                    // A null record whose columns are already known.
                    None if value.is_null() && self.registry.has_descendants(path) => continue,
                    None => {
                        return Err(CsvError::SchemaMismatch(format!(
                            "column '{}' is not part of the header {:?}",
                            path.render(self.registry.style()),
                            self.registry.names()
                        )));
                    }
                }
            } else {
                self.registry.resolve(path)?
            };

            if column >= slots.len() {
                slots.resize(column + 1, None);
            }
            if slots[column].is_some() {
                return Err(CsvError::SchemaMismatch(format!(
                    "column '{}' was written twice in one record",
                    path.render(self.registry.style())
                )));
            }
            slots[column] = Some(i);
        }

        for (column, slot) in slots.iter().enumerate() {
            if slot.is_some() {
                continue;
            }
            let Some(path) = self.registry.lookup(column) else {
                continue;
            };
            if !self.may_be_absent(path) {
                return Err(CsvError::SchemaMismatch(format!(
                    "record has no value for column '{}'",
                    path.render(self.registry.style())
                )));
            }
        }

        Ok(slots)
    }

    /// A header column may be missing from the row when it lies under a null
    /// value, or past the end of a shorter collection when padding is allowed.
    fn may_be_absent(&self, column: &ColumnPath) -> bool {
        if self.null_paths.iter().any(|null| column.starts_with(null)) {
            return true;
        }
        if self.config.ragged_collections == RaggedCollections::Forbid {
            return false;
        }

        column
            .segments()
            .iter()
            .enumerate()
            .any(|(depth, segment)| match segment {
                Segment::Index(index) => {
                    let parent = column.prefix(depth);
                    self.collections
                        .iter()
                        .any(|(path, len)| *path == parent && len <= index)
                }
                Segment::Field(_) => false,
            })
    }
}

/// Serializes one record and renders it.
pub(crate) fn encode_record<T: Serialize + ?Sized>(
    value: &T,
    registry: &mut HeaderRegistry,
    config: &CsvConfig,
) -> Result<String> {
    let mut encoder = RowEncoder::new(registry, config);
    value.serialize(&mut encoder)?;
    encoder.finish()
}

macro_rules! serialize_display {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<()> {
                self.encode_scalar(Scalar::Text(v.to_string()))
            }
        )*
    };
}

impl<'b> ser::Serializer for &mut RowEncoder<'b> {
    type Ok = ();
    type Error = CsvError;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    serialize_display! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.encode_scalar(Scalar::Text(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(v).map_err(|e| {
            CsvError::Unsupported(format!("bytes must be valid UTF-8 to fit in a cell: {e}"))
        })?;
        self.serialize_str(text)
    }

    fn serialize_none(self) -> Result<()> {
        self.encode_null()
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.encode_scalar(Scalar::Text(String::new()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.begin_field(variant)?;
        value.serialize(&mut *self)?;
        self.end_field()
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        self.begin_collection(len)?;
        Ok(self)
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.begin_collection(Some(len))?;
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_tuple(len)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.begin_field(variant)?;
        self.begin_collection(Some(len))?;
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        self.begin_structure()?;
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        self.begin_structure()?;
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        self.begin_field(variant)?;
        self.begin_structure()?;
        Ok(self)
    }
}

impl ser::SerializeSeq for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.begin_element()?;
        value.serialize(&mut **self)?;
        self.end_element()
    }

    fn end(self) -> Result<()> {
        self.end_collection()
    }
}

impl ser::SerializeTuple for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<()> {
        self.end_collection()
    }
}

impl ser::SerializeTupleStruct for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<()> {
        self.end_collection()
    }
}

/// Tuple variants are written as `Variant[0]`, `Variant[1]`.
impl ser::SerializeTupleVariant for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<()> {
        self.end_collection()?;
        self.end_field()
    }
}

impl ser::SerializeMap for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.pending_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| CsvError::Message("map value without a key".to_string()))?;
        self.begin_field(&key)?;
        value.serialize(&mut **self)?;
        self.end_field()
    }

    fn end(self) -> Result<()> {
        self.end_structure()
    }
}

impl ser::SerializeStruct for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.begin_field(key)?;
        value.serialize(&mut **self)?;
        self.end_field()
    }

    fn end(self) -> Result<()> {
        self.end_structure()
    }
}

impl ser::SerializeStructVariant for &mut RowEncoder<'_> {
    type Ok = ();
    type Error = CsvError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<()> {
        self.end_structure()?;
        self.end_field()
    }
}

/// Turns a map key into a field name.
struct MapKeySerializer;

fn key_must_be_text() -> CsvError {
    CsvError::Unsupported("map keys must be strings, characters, booleans or integers".to_string())
}

macro_rules! key_display {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<String> {
                Ok(v.to_string())
            }
        )*
    };
}

impl ser::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = CsvError;

    type SerializeSeq = ser::Impossible<String, CsvError>;
    type SerializeTuple = ser::Impossible<String, CsvError>;
    type SerializeTupleStruct = ser::Impossible<String, CsvError>;
    type SerializeTupleVariant = ser::Impossible<String, CsvError>;
    type SerializeMap = ser::Impossible<String, CsvError>;
    type SerializeStruct = ser::Impossible<String, CsvError>;
    type SerializeStructVariant = ser::Impossible<String, CsvError>;

    key_display! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(key_must_be_text())
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(key_must_be_text())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<String> {
        std::str::from_utf8(v)
            .map(str::to_string)
            .map_err(|_| key_must_be_text())
    }

    fn serialize_none(self) -> Result<String> {
        Err(key_must_be_text())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(key_must_be_text())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(key_must_be_text())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(key_must_be_text())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(key_must_be_text())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(key_must_be_text())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(key_must_be_text())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(key_must_be_text())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(key_must_be_text())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(key_must_be_text())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(key_must_be_text())
    }
}
