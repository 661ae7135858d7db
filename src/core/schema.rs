//! Header derivation from a type's `Deserialize` impl.
//!
//! Derived `Deserialize` impls announce their field names before any input is
//! read, so walking them with a deserializer that answers every request with a
//! placeholder value reveals the full column layout of a record, including
//! fields hidden behind `None` in the first record written. Only fixed shapes
//! can be traced: variable-length sequences, maps, self-describing values and
//! data-carrying enum variants are reported as [`CsvError::Unsupported`] and
//! left to first-record discovery.

use std::collections::HashMap;

use log::debug;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess,
    Visitor, value::BorrowedStrDeserializer,
};

use crate::{
    core::{
        config::CsvConfig,
        header::HeaderRegistry,
        path::{ColumnPath, PathBuilder, PathStyle, Segment},
    },
    error::{CsvError, Result},
};

const MAX_DEPTH: usize = 64;

/// Derives the frozen header of `T`.
///
/// ```
/// use flatcsv::core::{config::CsvConfig, schema::derive_header};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Address { city: String, zip: Option<String> }
///
/// #[derive(Deserialize)]
/// struct Person { name: String, address: Option<Address>, scores: [u8; 2] }
///
/// let header = derive_header::<Person>(&CsvConfig::default()).unwrap();
/// assert_eq!(header.names(), ["name", "address.city", "address.zip", "scores[0]", "scores[1]"]);
/// ```
pub fn derive_header<T: DeserializeOwned>(config: &CsvConfig) -> Result<HeaderRegistry> {
    let mut tracer = Tracer::new(config);
    tracer.trace::<T>()?;

    // Each pass follows one variant per enum; every further variant gets a pass of its own.
    for (path, count) in &tracer.enums {
        for variant in 1..*count {
            let mut alternative = Tracer::new(config);
            alternative.choices.insert(path.clone(), variant);
            alternative.trace::<T>()?;
        }
    }

    if tracer.columns.is_empty() {
        return Err(CsvError::Unsupported(
            "type has no columns to derive a header from".to_string(),
        ));
    }

    let registry = HeaderRegistry::from_paths(tracer.columns, config)?;
    debug!(
        "Derived header for {}: {:?}",
        std::any::type_name::<T>(),
        registry.names()
    );
    Ok(registry)
}

struct Tracer {
    path: PathBuilder,
    columns: Vec<ColumnPath>,
    style: PathStyle,
    /// Enums met so far, with their number of variants.
    enums: Vec<(ColumnPath, usize)>,
    /// Variant to follow per enum, the first one when absent.
    choices: HashMap<ColumnPath, usize>,
}

impl Tracer {
    fn new(config: &CsvConfig) -> Self {
        Self {
            path: PathBuilder::new(),
            columns: Vec::new(),
            style: PathStyle::from(config),
            enums: Vec::new(),
            choices: HashMap::new(),
        }
    }

    fn trace<T: DeserializeOwned>(&mut self) -> Result<()> {
        T::deserialize(&mut *self).map_err(|error| match error {
            CsvError::TypeCoercion { message, .. } => {
                CsvError::Unsupported(format!("cannot derive a header: {message}"))
            }
            other => other,
        })?;
        Ok(())
    }

    fn record(&mut self) {
        self.columns.push(self.path.current());
    }

    fn dynamic(&self, what: &str) -> CsvError {
        let location = self.path.current_path(&self.style);
        let location = if location.is_empty() {
            "the top level".to_string()
        } else {
            format!("'{location}'")
        };
        CsvError::Unsupported(format!("{what} at {location} has no fixed columns"))
    }

    fn check_depth(&self) -> Result<()> {
        if self.path.depth() > MAX_DEPTH {
            return Err(CsvError::Unsupported(format!(
                "nesting deeper than {MAX_DEPTH} levels, the type is probably recursive"
            )));
        }
        Ok(())
    }
}

macro_rules! trace_scalar {
    ($($method:ident => $visit:ident($value:expr)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                self.record();
                visitor.$visit($value)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for &mut Tracer {
    type Error = CsvError;

    trace_scalar! {
        deserialize_bool => visit_bool(false),
        deserialize_i8 => visit_i8(0),
        deserialize_i16 => visit_i16(0),
        deserialize_i32 => visit_i32(0),
        deserialize_i64 => visit_i64(0),
        deserialize_i128 => visit_i128(0),
        deserialize_u8 => visit_u8(0),
        deserialize_u16 => visit_u16(0),
        deserialize_u32 => visit_u32(0),
        deserialize_u64 => visit_u64(0),
        deserialize_u128 => visit_u128(0),
        deserialize_f32 => visit_f32(0.0),
        deserialize_f64 => visit_f64(0.0),
        deserialize_char => visit_char(' '),
        deserialize_str => visit_str(""),
        deserialize_string => visit_string(String::new()),
        deserialize_bytes => visit_bytes(&[]),
        deserialize_byte_buf => visit_byte_buf(Vec::new()),
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.record();
        visitor.visit_unit()
    }

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.dynamic("a self-describing value"))
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.record();
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.dynamic("a variable-length collection"))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        self.check_depth()?;
        visitor.visit_seq(TupleTrace {
            tracer: self,
            len,
            index: 0,
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.dynamic("a map"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.check_depth()?;
        visitor.visit_map(StructTrace {
            tracer: self,
            fields,
            index: 0,
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let path = self.path.current();
        let choice = self.choices.get(&path).copied().unwrap_or(0);
        let Some(&variant) = variants.get(choice) else {
            return Err(self.dynamic("an enum without variants"));
        };
        if !self.enums.iter().any(|(seen, _)| *seen == path) {
            self.enums.push((path, variants.len()));
        }
        visitor.visit_enum(EnumTrace {
            tracer: self,
            variant,
        })
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct StructTrace<'a> {
    tracer: &'a mut Tracer,
    fields: &'static [&'static str],
    index: usize,
}

impl<'de> MapAccess<'de> for StructTrace<'_> {
    type Error = CsvError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.fields.get(self.index) {
            Some(&field) => seed
                .deserialize(BorrowedStrDeserializer::<CsvError>::new(field))
                .map(Some),
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let field = self.fields[self.index];
        self.index += 1;

        self.tracer.path.enter(Segment::Field(field.to_string()));
        let value = seed.deserialize(&mut *self.tracer);
        self.tracer.path.exit();
        value
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.fields.len() - self.index)
    }
}

struct TupleTrace<'a> {
    tracer: &'a mut Tracer,
    len: usize,
    index: usize,
}

impl<'de> SeqAccess<'de> for TupleTrace<'_> {
    type Error = CsvError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.index >= self.len {
            return Ok(None);
        }
        self.tracer.path.enter(Segment::Index(self.index));
        self.index += 1;
        let value = seed.deserialize(&mut *self.tracer);
        self.tracer.path.exit();
        value.map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len - self.index)
    }
}

struct EnumTrace<'a> {
    tracer: &'a mut Tracer,
    variant: &'static str,
}

impl<'de, 'a> EnumAccess<'de> for EnumTrace<'a> {
    type Error = CsvError;
    type Variant = &'a mut Tracer;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let value = seed.deserialize(BorrowedStrDeserializer::<CsvError>::new(self.variant))?;
        Ok((value, self.tracer))
    }
}

impl<'de> VariantAccess<'de> for &mut Tracer {
    type Error = CsvError;

    fn unit_variant(self) -> Result<()> {
        self.record();
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, _seed: T) -> Result<T::Value> {
        Err(self.dynamic("an enum with data-carrying variants"))
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value> {
        Err(self.dynamic("an enum with data-carrying variants"))
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value> {
        Err(self.dynamic("an enum with data-carrying variants"))
    }
}
