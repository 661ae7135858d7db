pub mod config;

pub mod decoder;

pub mod driver;

pub mod encoder;

pub mod header;

pub mod item;

pub mod path;

pub mod quoting;

pub mod row;

pub mod schema;
