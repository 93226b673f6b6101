//! # reflectbuf - Reflective Record Manipulation
//!
//! reflectbuf is a reflection layer over a compact, zero-copy, tagged binary
//! record format. Given a schema (an in-memory description of the record
//! types) and a buffer holding a serialized root record, it supports four
//! operations without any generated code:
//!
//! - **Read**: typed scalar/string/sub-record getters, plus coercing
//!   readers that turn any field into an `i64`, `f64` or display string
//! - **Write**: in-place scalar overwrites, typed or coercing
//! - **Resize**: grow or shrink an embedded string or vector in place,
//!   repairing every offset the splice would otherwise break
//! - **Copy**: schema-driven deep copy of any sub-record into a fresh
//!   builder, flattening shared references into a tree
//!
//! ## Quick Start
//!
//! ```ignore
//! use reflectbuf::{Builder, FieldDef, ObjectDef, Record, Schema, TypeRef};
//! use reflectbuf::types::BaseType;
//!
//! let schema = Schema::new(
//!     vec![ObjectDef::table(
//!         "Pt",
//!         vec![
//!             FieldDef::new("x", 4, TypeRef::scalar(BaseType::Int)),
//!             FieldDef::new("name", 6, TypeRef::string()),
//!         ],
//!     )],
//!     vec![],
//!     0,
//! )?;
//!
//! let mut b = Builder::new();
//! let name = b.create_string("origin");
//! let start = b.start_table();
//! b.add_scalar::<i32>(4, 3);
//! b.add_offset(6, name);
//! let root = b.end_table(start, 2);
//! b.finish(root);
//! let mut buf = b.into_vec();
//!
//! let pt = schema.root_object();
//! let rec = Record::root(&buf);
//! assert_eq!(rec.get_i32(pt.field("x").unwrap()), 3);
//!
//! // Grow the embedded string in place; interior offsets are repaired.
//! let name_loc = rec.str_loc(pt.field("name").unwrap()).unwrap();
//! reflectbuf::set_string(&schema, &mut buf, name_loc, "much longer name")?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------+
//! |   Facades (set_string / resize_vector)      |
//! +----------------------+----------------------+
//! |   Resize engine      |   Deep-copy walker   |
//! |   (offset patching)  |   (two-pass rebuild) |
//! +----------------------+----------------------+
//! |   Record views / union resolution           |
//! +---------------------------------------------+
//! |   Schema descriptor graph                   |
//! +---------------------------------------------+
//! |   Layout primitives (LE scalars, vtables)   |
//! +---------------------------------------------+
//! ```
//!
//! ## Ownership and Concurrency
//!
//! The caller owns the buffer (`Vec<u8>`) throughout; views borrow it.
//! Reads share immutable borrows, mutation takes the buffer exclusively,
//! and a resize invalidates every location previously derived from the
//! buffer. Nothing here spawns threads or locks; all operations run
//! synchronously to completion.
//!
//! ## Module Overview
//!
//! - [`types`]: type tags, wire sizes, categories
//! - [`schema`]: the schema descriptor graph and its lookups
//! - [`layout`]: little-endian primitives, vtable and string/vector geometry
//! - [`access`]: record views, coercing accessors, union resolution
//! - [`builder`]: back-to-front record encoder with vtable deduplication
//! - [`resize`]: the in-place resize engine and its facades
//! - [`copy`]: the schema-driven deep-copy walker

#[macro_use]
mod macros;

pub mod access;
pub mod builder;
pub mod copy;
pub mod layout;
pub mod resize;
pub mod schema;
pub mod types;

pub use access::{union_object, union_object_for, Record, RecordMut, VectorView};
pub use builder::Builder;
pub use copy::copy_record;
pub use resize::{resize, resize_struct_vector, resize_vector, set_string};
pub use schema::{EnumDef, EnumVal, FieldDef, ObjectDef, Schema};
pub use types::{BaseType, TypeCategory, TypeRef};
