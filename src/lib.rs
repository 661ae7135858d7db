#![cfg_attr(docsrs, feature(doc_cfg))]
//#![warn(missing_docs)]

/*!
 <div align="center">
   <h1>flatcsv</h1>
   <h3>Nested records in, flat CSV rows out, and back again</h3>

   ![license](https://shields.io/badge/license-MIT%2FApache--2.0-blue)

  </div>

 # flatcsv

 A [serde](https://serde.rs) data format for RFC 4180 CSV that does not stop at flat structs.
 Every scalar leaf of a record becomes one column named after its path, so a record with nested
 structs, optional sub-records, sequences, tuples, maps and enums is written as a single row and
 read back from it. The header line is the whole schema: no side file is needed to rebuild the
 records.

 ## Core Concepts

- **Column path:** The sequence of field names and element indices leading to a scalar, rendered
  as `class_info.project.name` or `tags[0]`.
- **Header:** The ordered column paths of a session. It is discovered from the first record,
  given explicitly, or derived from the `Deserialize` impl of the record type, and then frozen.
- **Encode session:** Writes the header line, then one row per record, reporting any record that
  does not fit the frozen header.
- **Decode session:** Reads the header line and rebuilds one record per row.
- **ItemReader / ItemWriter:** Builder-configured adapters over the sessions that read one item at
  a time and write items in batches.

 ## Dialect

| **Option**             | **Default** | **Description**                                              |
|------------------------|-------------|--------------------------------------------------------------|
| delimiter              | `,`         | Field separator                                              |
| quote                  | `"`         | Quote character; embedded quotes are doubled                 |
| line_terminator        | `CRLF`      | `CRLF` or `LF`; both are accepted when reading               |
| include_header         | `true`      | Write and expect a header line                               |
| path_separator         | `.`         | Joins field names in column names                            |
| index_notation         | `bracket`   | `tags[0]`, or `tags.1` with `flatten_by_count`               |
| quote_empty_strings    | `false`     | Write `""` so that empty strings stay distinct from null     |
| null_representation    | empty       | Empty field, or a sentinel such as `\N`                      |
| ragged_collections     | `pad`       | Pad shorter collections with nulls, or `forbid` them         |
| skip_limit             | `0`         | Malformed lines tolerated while reading                      |

 ## Getting Started

```rust
use flatcsv::core::config::CsvConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ProjectInfo {
    name: String,
    build_system: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ClassInfo {
    name: String,
    project: Option<ProjectInfo>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestMethod {
    name: String,
    class_info: ClassInfo,
    position: (u32, u32),
}

let methods = vec![
    TestMethod {
        name: "parses, \"quoted\" input".to_string(),
        class_info: ClassInfo {
            name: "ParserTest".to_string(),
            project: Some(ProjectInfo {
                name: "core".to_string(),
                build_system: "Gradle".to_string(),
            }),
        },
        position: (12, 5),
    },
    TestMethod {
        name: "detached".to_string(),
        class_info: ClassInfo {
            name: "Orphan".to_string(),
            project: None,
        },
        position: (3, 1),
    },
];

let config = CsvConfig::default();
let csv = flatcsv::to_string(&methods, &config).unwrap();
assert_eq!(
    csv,
    "name,class_info.name,class_info.project.name,class_info.project.build_system,position[0],position[1]\r\n\
     \"parses, \"\"quoted\"\" input\",ParserTest,core,Gradle,12,5\r\n\
     detached,Orphan,,,3,1\r\n"
);

let decoded: Vec<TestMethod> = flatcsv::from_str(&csv, &config).unwrap();
assert_eq!(decoded, methods);
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

use std::io::{BufReader, Read, Write};

use serde::{Serialize, de::DeserializeOwned};

use crate::core::{
    config::CsvConfig,
    driver::{DecodeSession, EncodeSession},
};

pub mod core;

pub mod error;

#[doc(inline)]
pub use error::*;

pub mod item;

/// Encodes `records` into a string, header line first.
pub fn to_string<T: Serialize>(records: &[T], config: &CsvConfig) -> Result<String> {
    let bytes = to_writer(Vec::new(), records, config)?;
    String::from_utf8(bytes).map_err(|e| CsvError::Message(e.to_string()))
}

/// Encodes `records` into `writer` and returns it once flushed.
pub fn to_writer<W: Write, T: Serialize>(writer: W, records: &[T], config: &CsvConfig) -> Result<W> {
    let mut session = EncodeSession::new(writer, config.clone())?;
    for record in records {
        session.encode(record)?;
    }
    session.finish()
}

/// Decodes every record of `input`.
pub fn from_str<T: DeserializeOwned>(input: &str, config: &CsvConfig) -> Result<Vec<T>> {
    from_reader(input.as_bytes(), config)
}

/// Decodes every record read from `reader`.
pub fn from_reader<R: Read, T: DeserializeOwned>(reader: R, config: &CsvConfig) -> Result<Vec<T>> {
    let mut session = DecodeSession::new(BufReader::new(reader), config.clone())?;
    session.records().collect()
}
