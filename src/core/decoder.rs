//! Rebuilds records from tokenized rows.
//!
//! The header is grouped once into a [`Shape`] tree; each record is then
//! deserialized by walking that tree, with a leaf answering from its column.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor, value::StrDeserializer,
};

use crate::{
    core::{
        config::{CsvConfig, IndexNotation},
        header::{HeaderRegistry, Shape},
        quoting::Field,
    },
    error::{CsvError, Result},
};

#[derive(Clone, Copy)]
struct Row<'r> {
    fields: &'r [Field],
    registry: &'r HeaderRegistry,
    config: &'r CsvConfig,
}

impl<'r> Row<'r> {
    fn is_null(&self, column: usize) -> bool {
        self.fields[column].is_null(self.config)
    }

    fn name(&self, column: usize) -> &'r str {
        self.registry.name(column).unwrap_or_default()
    }

    fn all_null(&self, node: &Shape) -> bool {
        node.all_leaves(&|column| self.is_null(column))
    }
}

/// Deserializes one record against the header it was read with.
pub struct RowDecoder<'r> {
    shape: &'r Shape,
    row: Row<'r>,
}

impl<'r> RowDecoder<'r> {
    pub(crate) fn new(
        shape: &'r Shape,
        fields: &'r [Field],
        registry: &'r HeaderRegistry,
        config: &'r CsvConfig,
    ) -> Result<Self> {
        if fields.len() != registry.len() {
            return Err(CsvError::SchemaMismatch(format!(
                "record has {} field(s) but the header has {}",
                fields.len(),
                registry.len()
            )));
        }
        Ok(Self {
            shape,
            row: Row {
                fields,
                registry,
                config,
            },
        })
    }

    #[cfg(any(test, feature = "tests-cfg"))]
    pub fn for_tests(
        shape: &'r Shape,
        fields: &'r [Field],
        registry: &'r HeaderRegistry,
        config: &'r CsvConfig,
    ) -> Result<Self> {
        Self::new(shape, fields, registry, config)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(NodeDeserializer {
            row: self.row,
            node: self.shape,
        })
    }
}

/// Deserializes the subtree of one header node.
#[derive(Clone, Copy)]
struct NodeDeserializer<'r> {
    row: Row<'r>,
    node: &'r Shape,
}

impl<'r> NodeDeserializer<'r> {
    fn child(&self, node: &'r Shape) -> Self {
        Self { row: self.row, node }
    }

    /// Name of the first column below this node, for error messages.
    fn location(&self) -> String {
        let mut first = None;
        self.node.for_each_leaf(&mut |column| {
            first.get_or_insert(column);
        });
        match first {
            Some(column) => format!("'{}'", self.row.name(column)),
            None => "an empty record".to_string(),
        }
    }

    fn is_null(&self) -> bool {
        self.row.all_null(self.node)
    }

    fn leaf(&self) -> Result<(&'r Field, &'r str)> {
        match self.node {
            Shape::Leaf(column) => {
                let fields = self.row.fields;
                Ok((&fields[*column], self.row.name(*column)))
            }
            _ => Err(CsvError::SchemaMismatch(format!(
                "expected a single column at {}, found nested columns",
                self.location()
            ))),
        }
    }

    /// Raw text of a leaf. With the empty-field null representation a null
    /// reads as an empty string when `empty_when_null` is set.
    fn text(&self, empty_when_null: bool) -> Result<(&'r str, &'r str)> {
        let (field, column) = self.leaf()?;
        if field.is_null(self.row.config) {
            if empty_when_null && self.row.config.null_sentinel().is_none() {
                return Ok(("", column));
            }
            return Err(CsvError::TypeCoercion {
                column: column.to_string(),
                message: "null value for a non-optional field".to_string(),
            });
        }
        Ok((field.text.as_str(), column))
    }

    fn parse<T>(&self) -> Result<(T, &'r str)>
    where
        T: FromStr,
        T::Err: Display,
    {
        let (text, column) = self.text(false)?;
        text.parse::<T>()
            .map(|value| (value, column))
            .map_err(|e| CsvError::TypeCoercion {
                column: column.to_string(),
                message: format!("'{}' is not a valid {}: {}", text, std::any::type_name::<T>(), e),
            })
    }

    /// The elements of a collection node, indices from 0 without gaps.
    fn elements(
        &self,
        elements: &'r BTreeMap<usize, Shape>,
        trim_trailing_nulls: bool,
    ) -> Result<Vec<&'r Shape>> {
        let mut items = Vec::with_capacity(elements.len());
        while let Some(element) = elements.get(&items.len()) {
            items.push(element);
        }
        if items.len() != elements.len() {
            return Err(CsvError::SchemaMismatch(format!(
                "collection at {} does not have contiguous indices",
                self.location()
            )));
        }
        if trim_trailing_nulls {
            while items.last().is_some_and(|element| self.row.all_null(element)) {
                items.pop();
            }
        }
        Ok(items)
    }

    fn members(&self) -> Result<Vec<(String, &'r Shape)>> {
        match self.node {
            Shape::Record(children) => Ok(children
                .iter()
                .map(|(name, child)| (name.clone(), child))
                .collect()),
            Shape::Collection(elements) => {
                let base = match self.row.config.index_notation {
                    IndexNotation::Bracket => 0,
                    IndexNotation::FlattenByCount => 1,
                };
                Ok(elements
                    .iter()
                    .map(|(index, child)| ((index + base).to_string(), child))
                    .collect())
            }
            Shape::Leaf(_) if self.is_null() => Ok(Vec::new()),
            Shape::Leaf(_) => Err(CsvError::SchemaMismatch(format!(
                "expected nested columns at {}, found a single column",
                self.location()
            ))),
        }
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let (value, column) = self.parse::<$ty>()?;
                visitor.$visit::<CsvError>(value).map_err(|e| e.at_column(column))
            }
        )*
    };
}

impl<'de, 'r> de::Deserializer<'de> for NodeDeserializer<'r> {
    type Error = CsvError;

    deserialize_parsed! {
        deserialize_bool => visit_bool(bool),
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
        deserialize_char => visit_char(char),
    }

    /// Infers the most specific scalar: integer, float, boolean, then text.
    /// Quoted fields are always text.
    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            Shape::Record(_) => self.deserialize_map(visitor),
            Shape::Collection(_) => self.deserialize_seq(visitor),
            Shape::Leaf(_) => {
                let (field, column) = self.leaf()?;
                let result = if field.is_null(self.row.config) {
                    visitor.visit_none::<CsvError>()
                } else if field.quoted {
                    visitor.visit_str::<CsvError>(&field.text)
                } else if let Ok(value) = field.text.parse::<i64>() {
                    visitor.visit_i64::<CsvError>(value)
                } else if let Ok(value) = field.text.parse::<u64>() {
                    visitor.visit_u64::<CsvError>(value)
                } else if let Ok(value) = field.text.parse::<f64>() {
                    visitor.visit_f64::<CsvError>(value)
                } else if let Ok(value) = field.text.parse::<bool>() {
                    visitor.visit_bool::<CsvError>(value)
                } else {
                    visitor.visit_str::<CsvError>(&field.text)
                };
                result.map_err(|e| e.at_column(column))
            }
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let (text, column) = self.text(true)?;
        visitor.visit_str::<CsvError>(text).map_err(|e| e.at_column(column))
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let (text, column) = self.text(true)?;
        visitor
            .visit_bytes::<CsvError>(text.as_bytes())
            .map_err(|e| e.at_column(column))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let (field, column) = self.leaf()?;
        if field.is_null(self.row.config) || field.text.is_empty() {
            visitor.visit_unit()
        } else {
            Err(CsvError::TypeCoercion {
                column: column.to_string(),
                message: format!("expected an empty value, found '{}'", field.text),
            })
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let items = match self.node {
            Shape::Collection(elements) => self.elements(elements, true)?,
            Shape::Leaf(_) if self.is_null() => Vec::new(),
            _ => {
                return Err(CsvError::SchemaMismatch(format!(
                    "expected a collection at {}",
                    self.location()
                )));
            }
        };
        visitor.visit_seq(ElementAccess {
            row: self.row,
            elements: items.into_iter(),
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        match self.node {
            Shape::Collection(elements) => {
                let items = self.elements(elements, false)?;
                visitor.visit_seq(ElementAccess {
                    row: self.row,
                    elements: items.into_iter(),
                })
            }
            _ => Err(CsvError::SchemaMismatch(format!(
                "expected indexed columns at {}",
                self.location()
            ))),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let members = self.members()?;
        visitor.visit_map(MemberAccess {
            row: self.row,
            members: members.into_iter(),
            pending: None,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.node {
            Shape::Record(_) => self.deserialize_map(visitor),
            Shape::Leaf(column) if self.is_null() => Err(CsvError::TypeCoercion {
                column: self.row.name(*column).to_string(),
                message: "null value for a non-optional record".to_string(),
            }),
            _ => Err(CsvError::SchemaMismatch(format!(
                "expected named columns at {}",
                self.location()
            ))),
        }
    }

    /// A single column holds a unit variant by name; nested columns hold one
    /// subtree per variant, of which exactly one carries data.
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.node {
            Shape::Leaf(_) => {
                let (text, column) = self.text(false)?;
                let variant: StrDeserializer<'_, CsvError> = text.into_deserializer();
                visitor.visit_enum(variant).map_err(|e| e.at_column(column))
            }
            Shape::Record(children) => {
                let mut present = children
                    .iter()
                    .filter(|(_, child)| !self.row.all_null(child));
                let chosen = match (present.next(), present.next()) {
                    (Some(only), None) => only,
                    (None, _) if children.len() == 1 => &children[0],
                    _ => {
                        return Err(CsvError::TypeCoercion {
                            column: self.location().trim_matches('\'').to_string(),
                            message: "expected exactly one enum variant to carry a value"
                                .to_string(),
                        });
                    }
                };
                visitor.visit_enum(VariantAccessor {
                    name: chosen.0.as_str(),
                    payload: self.child(&chosen.1),
                })
            }
            Shape::Collection(_) => Err(CsvError::SchemaMismatch(format!(
                "expected an enum at {}, found indexed columns",
                self.location()
            ))),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct ElementAccess<'r> {
    row: Row<'r>,
    elements: std::vec::IntoIter<&'r Shape>,
}

impl<'de, 'r> SeqAccess<'de> for ElementAccess<'r> {
    type Error = CsvError;

    fn next_element_seed<S: DeserializeSeed<'de>>(&mut self, seed: S) -> Result<Option<S::Value>> {
        match self.elements.next() {
            Some(node) => seed
                .deserialize(NodeDeserializer {
                    row: self.row,
                    node,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.elements.len())
    }
}

struct MemberAccess<'r> {
    row: Row<'r>,
    members: std::vec::IntoIter<(String, &'r Shape)>,
    pending: Option<&'r Shape>,
}

impl<'de, 'r> MapAccess<'de> for MemberAccess<'r> {
    type Error = CsvError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.members.next() {
            Some((key, node)) => {
                self.pending = Some(node);
                seed.deserialize(KeyDeserializer { key }).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<S: DeserializeSeed<'de>>(&mut self, seed: S) -> Result<S::Value> {
        let node = self
            .pending
            .take()
            .ok_or_else(|| CsvError::Message("map value requested before its key".to_string()))?;
        seed.deserialize(NodeDeserializer {
            row: self.row,
            node,
        })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.members.len())
    }
}

struct VariantAccessor<'r> {
    name: &'r str,
    payload: NodeDeserializer<'r>,
}

impl<'de, 'r> EnumAccess<'de> for VariantAccessor<'r> {
    type Error = CsvError;
    type Variant = NodeDeserializer<'r>;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, Self::Variant)> {
        let name: StrDeserializer<'_, CsvError> = self.name.into_deserializer();
        Ok((seed.deserialize(name)?, self.payload))
    }
}

impl<'de, 'r> VariantAccess<'de> for NodeDeserializer<'r> {
    type Error = CsvError;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<S::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_tuple(self, len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}

/// Map keys come back as text; numeric and boolean keys are parsed on request.
struct KeyDeserializer {
    key: String,
}

impl KeyDeserializer {
    fn parse<T>(&self) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.key.parse::<T>().map_err(|e| CsvError::TypeCoercion {
            column: self.key.clone(),
            message: format!("map key is not a valid {}: {}", std::any::type_name::<T>(), e),
        })
    }
}

macro_rules! deserialize_key {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit(self.parse::<$ty>()?)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for KeyDeserializer {
    type Error = CsvError;

    deserialize_key! {
        deserialize_bool => visit_bool(bool),
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.key)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let variant: de::value::StringDeserializer<CsvError> = self.key.into_deserializer();
        visitor.visit_enum(variant)
    }

    serde::forward_to_deserialize_any! {
        char str string bytes byte_buf unit unit_struct seq tuple tuple_struct
        map struct identifier ignored_any
    }
}

/// Deserializes one tokenized record.
pub(crate) fn decode_record<T: DeserializeOwned>(
    shape: &Shape,
    fields: &[Field],
    registry: &HeaderRegistry,
    config: &CsvConfig,
) -> Result<T> {
    RowDecoder::new(shape, fields, registry, config)?.decode()
}
