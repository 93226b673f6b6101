//! # In-Place Resize Engine
//!
//! Grows or shrinks a variable-length item (string or vector) embedded in a
//! serialized buffer, without re-encoding anything else. The hard part is
//! that the buffer is full of relative offsets: every slot whose source and
//! target end up on opposite sides of the insertion point encodes a distance
//! that the splice is about to change, and has to be patched *before* any
//! byte moves.
//!
//! ## Algorithm
//!
//! 1. Round the delta up to a multiple of the largest scalar alignment
//!    (toward positive infinity for both signs, so a shrink never removes
//!    more than asked). A delta that rounds to zero is a no-op.
//! 2. Walk the schema-directed offset graph from the root. For every offset
//!    slot, apply the straddle test: the slot is patched by `±delta` exactly
//!    when its source lies below the insertion point and its target at or
//!    above it. Forward slots adjust by `+delta`; the record-to-vtable
//!    signed word by `-delta` (its target sits at the lower address).
//! 3. Splice: insert zero bytes or erase bytes at the insertion point.
//!
//! ## The Patched-Slot Bitmap
//!
//! Sub-records may be shared, so the walk can reach the same slot twice. A
//! patched slot no longer describes the buffer as it currently is, only as
//! it will be after the splice; reading one mid-walk would follow a broken
//! reference, and patching one twice would corrupt it. One bit per 4-byte
//! slot position records "already patched": consulted before every slot
//! read, set by every patch.
//!
//! ## Walk Order and Early Termination
//!
//! The walk is pre-order from the root record. All of a record's fields
//! live at strictly higher addresses than the record itself, so when the
//! insertion point is at or below the record, no interior slot can
//! straddle and the walk prunes the whole subtree. Scalar fields, absent
//! fields and inline structs carry no offsets and are skipped. Vectors
//! descend per element for non-struct object elements; vector-of-string
//! element slots get the straddle test without descent (strings contain no
//! offsets).
//!
//! ## Façades
//!
//! `set_string` and the vector resizers compute the insertion point and
//! delta, run the engine, then rewrite the opened region (new bytes and
//! length header). After any resize every location previously derived from
//! the buffer is stale; callers re-derive through the root.
//!
//! ## Failure Model
//!
//! Façades `ensure!` their location arguments are inside the buffer before
//! mutating anything. Schema inconsistencies discovered mid-walk (an
//! unresolvable union, an unknown tag) panic: by then the buffer may hold
//! patched offsets and no rollback exists, the same contract as an
//! allocation failure during the splice.

use eyre::{ensure, Result};

use crate::access;
use crate::layout::{self, Scalar, MAX_SCALAR_ALIGN, SIZE_UOFFSET};
use crate::schema::{FieldDef, ObjectDef, Schema};
use crate::types::BaseType;

struct ResizeContext<'a> {
    schema: &'a Schema,
    start: usize,
    delta: isize,
    buf: &'a mut Vec<u8>,
    patched: Vec<u8>,
}

/// Round toward positive infinity to a multiple of the largest scalar
/// alignment. Anything smaller would misalign every aligned scalar past
/// the insertion point.
fn align_delta(delta: isize) -> isize {
    let mask = MAX_SCALAR_ALIGN as isize - 1;
    (delta + mask) & !mask
}

/// Adjust every straddling offset slot by the (rounded) `delta`, then
/// insert or erase bytes at `start`.
pub fn resize(schema: &Schema, buf: &mut Vec<u8>, start: usize, delta: isize) -> Result<()> {
    ensure!(
        start <= buf.len(),
        "resize start {} beyond buffer of {} bytes",
        start,
        buf.len()
    );
    let delta = align_delta(delta);
    if delta == 0 {
        return Ok(());
    }
    if delta < 0 {
        ensure!(
            (-delta) as usize <= buf.len() - start,
            "cannot erase {} bytes at {} from a buffer of {} bytes",
            -delta,
            start,
            buf.len()
        );
    }

    let slot_count = buf.len() / SIZE_UOFFSET;
    let mut cx = ResizeContext {
        schema,
        start,
        delta,
        patched: vec![0u8; slot_count.div_ceil(8)],
        buf,
    };

    let root = layout::root_loc(cx.buf);
    cx.straddle_forward(0, root, 0);
    cx.resize_record(schema.root_object(), root);

    if delta > 0 {
        cx.buf
            .splice(start..start, std::iter::repeat(0u8).take(delta as usize));
    } else {
        cx.buf.drain(start..start + (-delta) as usize);
    }
    Ok(())
}

impl ResizeContext<'_> {
    fn already_patched(&self, loc: usize) -> bool {
        let idx = loc / SIZE_UOFFSET;
        self.patched[idx / 8] & (1 << (idx % 8)) != 0
    }

    fn mark_patched(&mut self, loc: usize) {
        let idx = loc / SIZE_UOFFSET;
        self.patched[idx / 8] |= 1 << (idx % 8);
    }

    /// True when the splice will change the distance between the two
    /// addresses: exactly one of them is at or above the insertion point.
    /// `first` must be the lower address of the pair.
    fn straddles(&self, first: usize, second: usize) -> bool {
        first < self.start && second >= self.start
    }

    fn straddle_forward(&mut self, first: usize, second: usize, slot: usize) {
        if self.straddles(first, second) {
            let stored = u32::read_at(self.buf, slot);
            u32::write_at(self.buf, slot, (stored as i64 + self.delta as i64) as u32);
            self.mark_patched(slot);
        }
    }

    fn straddle_signed(&mut self, first: usize, second: usize, slot: usize) {
        if self.straddles(first, second) {
            let stored = i32::read_at(self.buf, slot);
            i32::write_at(self.buf, slot, (stored as i64 - self.delta as i64) as i32);
            self.mark_patched(slot);
        }
    }

    fn resize_record(&mut self, obj: &ObjectDef, record_loc: usize) {
        if self.already_patched(record_loc) {
            return;
        }
        let vtable = layout::vtable_loc(self.buf, record_loc);
        // The signed word can point either way: shared vtables sit above
        // their later users, adjacent ones below. Only one check can fire.
        self.straddle_signed(record_loc, vtable, record_loc);
        self.straddle_signed(vtable, record_loc, record_loc);

        // Every field lives above the record start; nothing below the
        // insertion point remains in this subtree.
        if self.start <= record_loc {
            return;
        }

        let schema = self.schema;
        for field in obj.fields() {
            if field.ty.base.is_scalar() {
                continue;
            }
            let field_off = layout::field_offset_at(self.buf, vtable, field.offset);
            if field_off == 0 {
                continue;
            }
            let sub_obj = match field.ty.base {
                BaseType::Obj => {
                    Some(schema.object(field.ty.index.expect("object field has no type index")))
                }
                _ => None,
            };
            if sub_obj.is_some_and(|o| o.is_struct) {
                continue;
            }

            let slot = record_loc + field_off as usize;
            if self.already_patched(slot) {
                continue;
            }
            let target = layout::indirect(self.buf, slot);
            self.straddle_forward(slot, target, slot);

            match field.ty.base {
                BaseType::Obj => {
                    if let Some(sub) = sub_obj {
                        self.resize_record(sub, target);
                    }
                }
                BaseType::Union => {
                    let tag = self.read_union_tag(obj, field, record_loc, vtable);
                    let payload = access::union_object_for(schema, field, tag);
                    self.resize_record(payload, target);
                }
                BaseType::String => {}
                BaseType::Vector => self.resize_vector_elements(field, target),
                other => panic!("field {} has tag {:?} in a resize walk", field.name, other),
            }
        }
    }

    fn resize_vector_elements(&mut self, field: &FieldDef, vector_loc: usize) {
        match field.ty.element {
            BaseType::Obj => {
                let elem_obj = self
                    .schema
                    .object(field.ty.index.expect("object vector has no type index"));
                if elem_obj.is_struct {
                    return;
                }
                let len = layout::len_at(self.buf, vector_loc) as usize;
                for i in 0..len {
                    let slot = vector_loc + SIZE_UOFFSET + i * SIZE_UOFFSET;
                    if self.already_patched(slot) {
                        continue;
                    }
                    let target = layout::indirect(self.buf, slot);
                    self.straddle_forward(slot, target, slot);
                    self.resize_record(elem_obj, target);
                }
            }
            BaseType::String => {
                // Element slots still need the straddle test; the strings
                // themselves hold no offsets.
                let len = layout::len_at(self.buf, vector_loc) as usize;
                for i in 0..len {
                    let slot = vector_loc + SIZE_UOFFSET + i * SIZE_UOFFSET;
                    if self.already_patched(slot) {
                        continue;
                    }
                    let target = layout::indirect(self.buf, slot);
                    self.straddle_forward(slot, target, slot);
                }
            }
            _ => {}
        }
    }

    /// Union discriminants are read through the vtable location resolved
    /// before this record's signed word was patched; the stored word may
    /// already describe post-splice geometry.
    fn read_union_tag(
        &self,
        obj: &ObjectDef,
        union_field: &FieldDef,
        record_loc: usize,
        vtable: usize,
    ) -> i64 {
        let key = format!("{}_type", union_field.name);
        let tag_field = obj.field(&key).unwrap_or_else(|| {
            panic!(
                "object {} is missing union discriminant field {}",
                obj.name, key
            )
        });
        match layout::field_offset_at(self.buf, vtable, tag_field.offset) {
            0 => tag_field.default_integer,
            off => u8::read_at(self.buf, record_loc + off as usize) as i64,
        }
    }
}

/// Replace the contents of the string whose length header sits at
/// `str_loc`, growing or shrinking the buffer as needed. Every location
/// derived from the buffer before this call is stale afterwards.
pub fn set_string(schema: &Schema, buf: &mut Vec<u8>, str_loc: usize, value: &str) -> Result<()> {
    ensure!(
        str_loc + SIZE_UOFFSET <= buf.len(),
        "string location {} beyond buffer of {} bytes",
        str_loc,
        buf.len()
    );
    let old_len = layout::len_at(buf, str_loc) as usize;
    let start = str_loc + SIZE_UOFFSET;
    ensure!(
        start + old_len < buf.len(),
        "string at {} with length {} overruns buffer of {} bytes",
        str_loc,
        old_len,
        buf.len()
    );

    let delta = value.len() as isize - old_len as isize;
    if delta != 0 {
        if delta < 0 {
            // The dropped tail must not survive as readable garbage.
            buf[start..start + old_len].fill(0);
        }
        resize(schema, buf, start, delta)?;
        u32::write_at(buf, str_loc, value.len() as u32);
    }
    buf[start..start + value.len()].copy_from_slice(value.as_bytes());
    buf[start + value.len()] = 0;
    Ok(())
}

/// Resize the scalar vector whose length header sits at `vec_loc` to
/// `new_len` elements, filling any newly opened slots with `fill`.
pub fn resize_vector<T: Scalar>(
    schema: &Schema,
    buf: &mut Vec<u8>,
    vec_loc: usize,
    new_len: u32,
    fill: T,
) -> Result<()> {
    resize_vector_raw(
        schema,
        buf,
        vec_loc,
        new_len,
        T::SIZE,
        |buf, loc| T::write_at(buf, loc, fill),
    )
}

/// Resize a vector of inline structs; `fill` is the byte image stamped
/// into each newly opened element.
pub fn resize_struct_vector(
    schema: &Schema,
    buf: &mut Vec<u8>,
    vec_loc: usize,
    new_len: u32,
    elem_size: usize,
    fill: &[u8],
) -> Result<()> {
    ensure!(
        fill.len() == elem_size,
        "fill image of {} bytes for elements of {} bytes",
        fill.len(),
        elem_size
    );
    resize_vector_raw(schema, buf, vec_loc, new_len, elem_size, |buf, loc| {
        buf[loc..loc + fill.len()].copy_from_slice(fill)
    })
}

fn resize_vector_raw(
    schema: &Schema,
    buf: &mut Vec<u8>,
    vec_loc: usize,
    new_len: u32,
    elem_size: usize,
    write_fill: impl Fn(&mut [u8], usize),
) -> Result<()> {
    ensure!(
        vec_loc + SIZE_UOFFSET <= buf.len(),
        "vector location {} beyond buffer of {} bytes",
        vec_loc,
        buf.len()
    );
    let old_len = layout::len_at(buf, vec_loc) as usize;
    ensure!(
        vec_loc + SIZE_UOFFSET + old_len * elem_size <= buf.len(),
        "vector at {} with {} elements overruns buffer of {} bytes",
        vec_loc,
        old_len,
        buf.len()
    );

    let delta_elems = new_len as i64 - old_len as i64;
    let delta_bytes = delta_elems as isize * elem_size as isize;
    if delta_bytes == 0 {
        return Ok(());
    }
    // Grow past the last element; shrink from the first dropped one.
    let start = vec_loc + SIZE_UOFFSET + elem_size * old_len.min(new_len as usize);

    resize(schema, buf, start, delta_bytes)?;
    u32::write_at(buf, vec_loc, new_len);
    for i in 0..delta_elems.max(0) as usize {
        write_fill(buf, start + i * elem_size);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Record;
    use crate::builder::Builder;
    use crate::schema::{EnumDef, EnumVal, FieldDef, ObjectDef, Schema};
    use crate::types::TypeRef;

    fn item_schema() -> Schema {
        Schema::new(
            vec![ObjectDef::table(
                "Item",
                vec![
                    FieldDef::new("qty", 4, TypeRef::scalar(BaseType::Int)),
                    FieldDef::new("name", 6, TypeRef::string()),
                    FieldDef::new("counts", 8, TypeRef::vector(BaseType::Int, None)),
                ],
            )],
            vec![],
            0,
        )
        .unwrap()
    }

    fn item_buffer(name: &str, counts: &[i32]) -> Vec<u8> {
        let mut b = Builder::new();
        let name_off = b.create_string(name);
        b.start_vector(4, counts.len());
        for v in counts.iter().rev() {
            b.push_bytes(&v.to_le_bytes());
        }
        let counts_off = b.end_vector(counts.len());
        let start = b.start_table();
        b.add_scalar::<i32>(4, 7);
        b.add_offset(6, name_off);
        b.add_offset(8, counts_off);
        let root = b.end_table(start, 3);
        b.finish(root);
        b.into_vec()
    }

    #[test]
    fn delta_rounds_up_for_both_signs() {
        assert_eq!(align_delta(0), 0);
        assert_eq!(align_delta(1), 8);
        assert_eq!(align_delta(8), 8);
        assert_eq!(align_delta(9), 16);
        assert_eq!(align_delta(-1), 0);
        assert_eq!(align_delta(-8), -8);
        assert_eq!(align_delta(-9), -8);
        assert_eq!(align_delta(-16), -16);
    }

    #[test]
    fn under_aligned_shrink_is_a_no_op() {
        let schema = item_schema();
        let mut buf = item_buffer("ab", &[]);
        let before = buf.clone();
        resize(&schema, &mut buf, 8, -7).unwrap();
        assert_eq!(buf, before);
    }

    #[test]
    fn string_grow_keeps_every_field_readable() {
        let schema = item_schema();
        let mut buf = item_buffer("ab", &[1, 2]);
        let obj = schema.root_object();
        let old_size = buf.len();

        let str_loc = Record::root(&buf).str_loc(obj.field("name").unwrap()).unwrap();
        set_string(&schema, &mut buf, str_loc, "abcdef").unwrap();

        // delta 4 rounds to one full alignment step
        assert_eq!(buf.len(), old_size + 8);
        let rec = Record::root(&buf);
        assert_eq!(rec.get_str(obj.field("name").unwrap()), Some("abcdef"));
        assert_eq!(rec.get_i32(obj.field("qty").unwrap()), 7);
        let counts = rec.get_vector::<i32>(obj.field("counts").unwrap()).unwrap();
        assert_eq!(counts.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn string_shrink_zeroes_the_dropped_tail() {
        let schema = item_schema();
        let mut buf = item_buffer("hello world", &[]);
        let obj = schema.root_object();
        let old_size = buf.len();

        let str_loc = Record::root(&buf).str_loc(obj.field("name").unwrap()).unwrap();
        set_string(&schema, &mut buf, str_loc, "hi").unwrap();

        // delta -9 rounds to -8
        assert_eq!(buf.len(), old_size - 8);
        let rec = Record::root(&buf);
        assert_eq!(rec.get_str(obj.field("name").unwrap()), Some("hi"));
        let new_str_loc = rec.str_loc(obj.field("name").unwrap()).unwrap();
        assert_eq!(new_str_loc, str_loc);
        // Whatever survives of the old content past the new terminator is
        // zeroed, not stale text.
        assert!(buf[new_str_loc + 4 + 2..].iter().all(|&b| b == 0));
        assert_eq!(rec.get_i32(obj.field("qty").unwrap()), 7);
    }

    #[test]
    fn scalar_vector_grows_with_fill() {
        let schema = item_schema();
        let mut buf = item_buffer("x", &[10, 20, 30]);
        let obj = schema.root_object();

        let vec_loc = Record::root(&buf)
            .vector_loc(obj.field("counts").unwrap())
            .unwrap();
        resize_vector::<i32>(&schema, &mut buf, vec_loc, 5, 99).unwrap();

        let rec = Record::root(&buf);
        let counts = rec.get_vector::<i32>(obj.field("counts").unwrap()).unwrap();
        assert_eq!(counts.iter().collect::<Vec<_>>(), vec![10, 20, 30, 99, 99]);
        assert_eq!(rec.get_str(obj.field("name").unwrap()), Some("x"));
    }

    #[test]
    fn scalar_vector_shrinks_in_place() {
        let schema = item_schema();
        let mut buf = item_buffer("x", &[10, 20, 30, 40]);
        let obj = schema.root_object();

        let vec_loc = Record::root(&buf)
            .vector_loc(obj.field("counts").unwrap())
            .unwrap();
        resize_vector::<i32>(&schema, &mut buf, vec_loc, 2, 0).unwrap();

        let rec = Record::root(&buf);
        let counts = rec.get_vector::<i32>(obj.field("counts").unwrap()).unwrap();
        assert_eq!(counts.iter().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(rec.get_str(obj.field("name").unwrap()), Some("x"));
        assert_eq!(rec.get_i32(obj.field("qty").unwrap()), 7);
    }

    #[test]
    fn buffer_size_stays_congruent_modulo_max_align() {
        let schema = item_schema();
        let mut buf = item_buffer("seed", &[1]);
        let obj = schema.root_object();
        let residue = buf.len() % MAX_SCALAR_ALIGN;

        let str_loc = Record::root(&buf).str_loc(obj.field("name").unwrap()).unwrap();
        set_string(&schema, &mut buf, str_loc, "a much longer value").unwrap();
        assert_eq!(buf.len() % MAX_SCALAR_ALIGN, residue);

        let str_loc = Record::root(&buf).str_loc(obj.field("name").unwrap()).unwrap();
        set_string(&schema, &mut buf, str_loc, "s").unwrap();
        assert_eq!(buf.len() % MAX_SCALAR_ALIGN, residue);
    }

    #[test]
    fn facade_rejects_out_of_range_locations() {
        let schema = item_schema();
        let mut buf = item_buffer("ab", &[]);
        let len = buf.len();
        assert!(set_string(&schema, &mut buf, len, "x").is_err());
        assert!(resize_vector::<i32>(&schema, &mut buf, len, 3, 0).is_err());
    }

    fn union_schema() -> Schema {
        let ping = ObjectDef::table(
            "Ping",
            vec![
                FieldDef::new("greeting", 4, TypeRef::string()),
                FieldDef::new("detail", 6, TypeRef::string()),
            ],
        );
        let pong = ObjectDef::table(
            "Pong",
            vec![FieldDef::new("code", 4, TypeRef::scalar(BaseType::Int))],
        );
        let packet = ObjectDef::table(
            "Packet",
            vec![
                FieldDef::new("body_type", 4, TypeRef::scalar(BaseType::UType)),
                FieldDef::new("body", 6, TypeRef::union(0)),
                FieldDef::new("note", 8, TypeRef::string()),
            ],
        );
        let body_enum = EnumDef::new(
            "Body",
            vec![
                EnumVal { value: 0, object: None },
                EnumVal { value: 1, object: Some(0) },
                EnumVal { value: 2, object: Some(1) },
            ],
        );
        Schema::new(vec![ping, pong, packet], vec![body_enum], 2).unwrap()
    }

    #[test]
    fn union_walk_follows_the_discriminant() {
        let schema = union_schema();
        let packet = schema.root_object();
        let ping = schema.object_named("Ping").unwrap();

        let mut b = Builder::new();
        let greeting = b.create_string("salutations");
        let detail = b.create_string("hi");
        let s = b.start_table();
        b.add_offset(4, greeting);
        b.add_offset(6, detail);
        let ping_off = b.end_table(s, 2);
        let note = b.create_string("n");
        let s = b.start_table();
        b.add_scalar::<u8>(4, 1);
        b.add_offset(6, ping_off);
        b.add_offset(8, note);
        let root = b.end_table(s, 3);
        b.finish(root);
        let mut buf = b.into_vec();

        // Grow the lower of Ping's two strings. The slot referring to the
        // upper one straddles the insertion point, so it only survives if
        // the walk resolves the payload as Ping and descends into it; a
        // misresolved Pong would treat that slot as a scalar and leave it
        // stale.
        let rec = Record::root(&buf);
        let payload = rec.get_record(packet.field("body").unwrap()).unwrap();
        let detail_loc = payload.str_loc(ping.field("detail").unwrap()).unwrap();
        set_string(&schema, &mut buf, detail_loc, "hello there").unwrap();

        let rec = Record::root(&buf);
        let payload = rec.get_record(packet.field("body").unwrap()).unwrap();
        assert_eq!(
            payload.get_str(ping.field("detail").unwrap()),
            Some("hello there")
        );
        assert_eq!(
            payload.get_str(ping.field("greeting").unwrap()),
            Some("salutations")
        );
        assert_eq!(rec.get_str(packet.field("note").unwrap()), Some("n"));
    }

    #[test]
    fn shared_vtable_above_its_record_is_repatched() {
        let schema = union_schema();
        let packet = schema.root_object();
        let pong = schema.object_named("Pong").unwrap();

        // Two Pong tables with the same shape share one vtable; the second
        // stores a negative soffset pointing above itself. Growing a string
        // that sits between the two exercises the backward adjustment.
        let mut b = Builder::new();
        let s = b.start_table();
        b.add_scalar::<i32>(4, 100);
        let _pong_a = b.end_table(s, 1);
        let note = b.create_string("mid");
        let s = b.start_table();
        b.add_scalar::<i32>(4, 200);
        let pong_b = b.end_table(s, 1);
        let s = b.start_table();
        b.add_scalar::<u8>(4, 2);
        b.add_offset(6, pong_b);
        b.add_offset(8, note);
        let root = b.end_table(s, 3);
        b.finish(root);
        let mut buf = b.into_vec();

        let rec = Record::root(&buf);
        let body = rec.get_record(packet.field("body").unwrap()).unwrap();
        assert!(i32::read_at(&buf, body.loc()) < 0);
        assert_eq!(body.get_i32(pong.field("code").unwrap()), 200);

        let note_loc = rec.str_loc(packet.field("note").unwrap()).unwrap();
        set_string(&schema, &mut buf, note_loc, "a considerably longer note").unwrap();

        let rec = Record::root(&buf);
        let body = rec.get_record(packet.field("body").unwrap()).unwrap();
        assert_eq!(body.get_i32(pong.field("code").unwrap()), 200);
        assert_eq!(
            rec.get_str(packet.field("note").unwrap()),
            Some("a considerably longer note")
        );
    }
}
