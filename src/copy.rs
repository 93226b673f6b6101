//! # Deep-Copy Walker
//!
//! Reconstructs a record tree into a fresh builder, schema-directed. Useful
//! for extracting one sub-record out of a larger buffer, merging records
//! from several buffers, and re-encoding a buffer whose in-place resizes
//! have left alignment garbage behind.
//!
//! Two passes per record, because the builder is append-only and a table's
//! offset fields can only be written once their targets exist: pass one
//! serializes every referenced child (strings, sub-records, vectors) and
//! collects their offsets; pass two lays down the table itself, consuming
//! those offsets in the same field order.
//!
//! Shared sub-records are *not* detected: a DAG copies as a tree, with one
//! duplicate per extra reference. Re-sharing is the caller's job if it
//! matters.

use smallvec::SmallVec;

use crate::access::{self, Record};
use crate::builder::Builder;
use crate::layout::{self, SIZE_UOFFSET};
use crate::schema::{ObjectDef, Schema};
use crate::types::BaseType;

/// Copy `record` (described by `object`) into `builder`, returning the
/// builder offset of the copy.
///
/// # Panics
///
/// Panics on schema inconsistencies: a union without its discriminant
/// sibling, or a composite field whose schema index is missing.
pub fn copy_record(
    builder: &mut Builder,
    schema: &Schema,
    object: &ObjectDef,
    record: Record<'_>,
) -> u32 {
    let buf = record.data();

    if object.is_struct {
        let start = record.loc();
        return builder.create_struct(&buf[start..start + object.bytesize], object.minalign);
    }

    // Pass one: serialize children, in schema field order.
    let mut offsets: SmallVec<[u32; 16]> = SmallVec::new();
    for field in object.fields() {
        if !record.is_present(field) {
            continue;
        }
        let child = match field.ty.base {
            BaseType::String => {
                let str_loc = record.str_loc(field).unwrap();
                Some(builder.create_byte_string(layout::string_bytes(buf, str_loc)))
            }
            BaseType::Obj => {
                let sub = schema.object(field.ty.index.expect("object field has no type index"));
                if sub.is_struct {
                    None
                } else {
                    let sub_rec = record.get_record(field).unwrap();
                    Some(copy_record(builder, schema, sub, sub_rec))
                }
            }
            BaseType::Union => {
                let sub = access::union_object(schema, object, field, &record);
                let sub_rec = record.get_record(field).unwrap();
                Some(copy_record(builder, schema, sub, sub_rec))
            }
            BaseType::Vector => {
                let vec_loc = record.vector_loc(field).unwrap();
                Some(copy_vector(builder, schema, field, buf, vec_loc))
            }
            _ => None,
        };
        if let Some(offset) = child {
            offsets.push(offset);
        }
    }

    // Pass two: the table itself, scalars and structs inline, composites
    // consuming the collected offsets.
    let start = builder.start_table();
    let mut next_offset = 0;
    for field in object.fields() {
        if !record.is_present(field) {
            continue;
        }
        match field.ty.base {
            BaseType::Obj => {
                let sub = schema.object(field.ty.index.expect("object field has no type index"));
                if sub.is_struct {
                    let loc = record.get_struct_loc(field).unwrap();
                    builder.push_inline(field.offset, &buf[loc..loc + sub.bytesize], sub.minalign);
                } else {
                    builder.add_offset(field.offset, offsets[next_offset]);
                    next_offset += 1;
                }
            }
            BaseType::Union | BaseType::String | BaseType::Vector => {
                builder.add_offset(field.offset, offsets[next_offset]);
                next_offset += 1;
            }
            _ => {
                let loc = layout::field_loc(buf, record.loc(), field.offset).unwrap();
                let size = field.ty.base.size();
                builder.push_inline(field.offset, &buf[loc..loc + size], size);
            }
        }
    }
    debug_assert_eq!(next_offset, offsets.len());
    builder.end_table(start, object.fields().len())
}

fn copy_vector(
    builder: &mut Builder,
    schema: &Schema,
    field: &crate::schema::FieldDef,
    buf: &[u8],
    vec_loc: usize,
) -> u32 {
    let len = layout::len_at(buf, vec_loc) as usize;
    match field.ty.element {
        BaseType::String => {
            let mut elements: SmallVec<[u32; 16]> = SmallVec::with_capacity(len);
            for i in 0..len {
                let slot = vec_loc + SIZE_UOFFSET + i * SIZE_UOFFSET;
                let str_loc = layout::indirect(buf, slot);
                elements.push(builder.create_byte_string(layout::string_bytes(buf, str_loc)));
            }
            builder.create_vector_of_offsets(&elements)
        }
        BaseType::Obj
            if !schema
                .object(field.ty.index.expect("object vector has no type index"))
                .is_struct =>
        {
            let elem_obj = schema.object(field.ty.index.unwrap());
            let mut elements: SmallVec<[u32; 16]> = SmallVec::with_capacity(len);
            for i in 0..len {
                let slot = vec_loc + SIZE_UOFFSET + i * SIZE_UOFFSET;
                let elem = Record::at(buf, layout::indirect(buf, slot));
                elements.push(copy_record(builder, schema, elem_obj, elem));
            }
            builder.create_vector_of_offsets(&elements)
        }
        element => {
            // Scalars and structs: one raw copy of the element array.
            let elem_size = match element {
                BaseType::Obj => {
                    schema
                        .object(field.ty.index.expect("object vector has no type index"))
                        .bytesize
                }
                _ => element.size(),
            };
            builder.start_vector(elem_size, len);
            builder.push_bytes(&buf[vec_loc + SIZE_UOFFSET..vec_loc + SIZE_UOFFSET + len * elem_size]);
            builder.end_vector(len)
        }
    }
}
