//! # Record Views and Field Access
//!
//! Zero-copy views over a serialized record, driven by schema field
//! descriptors. `Record` borrows immutably and serves every read; `RecordMut`
//! borrows exclusively and overwrites scalar fields in place.
//!
//! ## Access Families
//!
//! | Family | Behavior |
//! |--------|----------|
//! | `get_int::<T>` / `get_float::<T>` | exact-width read, schema default when absent |
//! | `get_str` / `get_record` / `get_vector` | dereference a forward slot, `None` when absent |
//! | `get_any_*` | coerce whatever the field is to `i64` / `f64` / `String` |
//! | `set_int::<T>` / `set_float::<T>` | in-place overwrite, `false` when absent |
//! | `set_any_*` | coerce and dispatch on the field's tag |
//!
//! The `any` readers never fail: unsupported conversions produce `0`, `0.0`
//! or a placeholder literal. The `any` writers silently skip string-typed
//! targets, whose storage cannot be grown through a plain field write.
//!
//! ## Union Resolution
//!
//! A union field's payload type is named by a sibling scalar field whose
//! name is the union field's name with `_type` appended. The convention is
//! load-bearing: schemas that rename the discriminant break resolution.

use std::marker::PhantomData;

use crate::layout::{self, FloatScalar, IntScalar, Scalar};
use crate::schema::{FieldDef, ObjectDef, Schema};
use crate::types::BaseType;

/// Read-only view of one record inside a buffer.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    buf: &'a [u8],
    loc: usize,
}

impl<'a> Record<'a> {
    /// View the buffer's root record.
    pub fn root(buf: &'a [u8]) -> Self {
        Self {
            buf,
            loc: layout::root_loc(buf),
        }
    }

    /// View the record at a known location.
    pub fn at(buf: &'a [u8], loc: usize) -> Self {
        Self { buf, loc }
    }

    pub fn data(&self) -> &'a [u8] {
        self.buf
    }

    pub fn loc(&self) -> usize {
        self.loc
    }

    /// Whether the field has storage in this record.
    pub fn is_present(&self, field: &FieldDef) -> bool {
        layout::field_loc(self.buf, self.loc, field.offset).is_some()
    }

    fn slot(&self, field: &FieldDef) -> Option<usize> {
        layout::field_loc(self.buf, self.loc, field.offset)
    }

    /// Read an integer-family scalar field at its exact width.
    ///
    /// # Panics
    ///
    /// Debug builds panic when `T`'s width differs from the field's wire
    /// width; that mismatch is a bug at the call site, not a data error.
    pub fn get_int<T: IntScalar>(&self, field: &FieldDef) -> T {
        debug_assert_eq!(
            T::SIZE,
            field.ty.base.size(),
            "scalar width mismatch reading field {}",
            field.name
        );
        match self.slot(field) {
            Some(loc) => T::read_at(self.buf, loc),
            None => T::from_i64(field.default_integer),
        }
    }

    /// Read a float-family scalar field at its exact width.
    pub fn get_float<T: FloatScalar>(&self, field: &FieldDef) -> T {
        debug_assert_eq!(
            T::SIZE,
            field.ty.base.size(),
            "scalar width mismatch reading field {}",
            field.name
        );
        match self.slot(field) {
            Some(loc) => T::read_at(self.buf, loc),
            None => T::from_f64(field.default_real),
        }
    }

    typed_getters! {
        ints { bool, u8, i8, u16, i16, u32, i32, u64, i64 }
        floats { f32, f64 }
    }

    /// Dereference a string field. `None` when absent or not valid UTF-8.
    pub fn get_str(&self, field: &FieldDef) -> Option<&'a str> {
        debug_assert_eq!(field.ty.base, BaseType::String, "field {}", field.name);
        let str_loc = self.str_loc(field)?;
        std::str::from_utf8(layout::string_bytes(self.buf, str_loc)).ok()
    }

    /// Dereference a sub-record field (`Obj` table or `Union` payload).
    pub fn get_record(&self, field: &FieldDef) -> Option<Record<'a>> {
        debug_assert!(
            matches!(field.ty.base, BaseType::Obj | BaseType::Union),
            "field {}",
            field.name
        );
        let slot = self.slot(field)?;
        Some(Record::at(self.buf, layout::indirect(self.buf, slot)))
    }

    /// Location of an inline struct field's first byte.
    pub fn get_struct_loc(&self, field: &FieldDef) -> Option<usize> {
        debug_assert_eq!(field.ty.base, BaseType::Obj, "field {}", field.name);
        self.slot(field)
    }

    /// Dereference a vector field with inline elements of type `T`.
    pub fn get_vector<T: Scalar>(&self, field: &FieldDef) -> Option<VectorView<'a, T>> {
        debug_assert_eq!(field.ty.base, BaseType::Vector, "field {}", field.name);
        debug_assert_eq!(
            T::SIZE,
            field.ty.element.size(),
            "element width mismatch reading field {}",
            field.name
        );
        let loc = self.vector_loc(field)?;
        Some(VectorView {
            buf: self.buf,
            loc,
            _elem: PhantomData,
        })
    }

    /// Location of a string field's length header, for the resize facades.
    pub fn str_loc(&self, field: &FieldDef) -> Option<usize> {
        let slot = self.slot(field)?;
        Some(layout::indirect(self.buf, slot))
    }

    /// Location of a vector field's length header, for the resize facades.
    pub fn vector_loc(&self, field: &FieldDef) -> Option<usize> {
        let slot = self.slot(field)?;
        Some(layout::indirect(self.buf, slot))
    }

    /// Read any field as an `i64`. Integer scalars widen, floats truncate,
    /// strings parse as decimal (0 on failure), composites yield 0.
    pub fn get_any_int(&self, field: &FieldDef) -> i64 {
        match field.ty.base {
            BaseType::UType | BaseType::Bool | BaseType::UByte => {
                self.get_int::<u8>(field) as i64
            }
            BaseType::Byte => self.get_int::<i8>(field) as i64,
            BaseType::Short => self.get_int::<i16>(field) as i64,
            BaseType::UShort => self.get_int::<u16>(field) as i64,
            BaseType::Int => self.get_int::<i32>(field) as i64,
            BaseType::UInt => self.get_int::<u32>(field) as i64,
            BaseType::Long => self.get_int::<i64>(field),
            BaseType::ULong => self.get_int::<u64>(field) as i64,
            BaseType::Float => self.get_float::<f32>(field) as i64,
            BaseType::Double => self.get_float::<f64>(field) as i64,
            BaseType::String => self
                .get_str(field)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Read any field as an `f64`. Floats read natively, strings parse,
    /// everything else goes through `get_any_int` and widens.
    pub fn get_any_float(&self, field: &FieldDef) -> f64 {
        match field.ty.base {
            BaseType::Float => self.get_float::<f32>(field) as f64,
            BaseType::Double => self.get_float::<f64>(field),
            BaseType::String => self
                .get_str(field)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0.0),
            _ => self.get_any_int(field) as f64,
        }
    }

    /// Render any field as text. Tables format recursively as
    /// `Name { field: value, }` with string values quoted (no escaping);
    /// structs, unions and vectors format as placeholder literals. Debug
    /// output only, not a stable interchange format.
    pub fn get_any_string(&self, field: &FieldDef, schema: &Schema) -> String {
        match field.ty.base {
            BaseType::Float | BaseType::Double => format!("{}", self.get_any_float(field)),
            BaseType::String => self.get_str(field).unwrap_or_default().to_string(),
            BaseType::Obj => {
                let obj = schema.object(field.ty.index.expect("object field has no type index"));
                if obj.is_struct {
                    return format!("{}(struct)", obj.name);
                }
                let mut out = format!("{} {{ ", obj.name);
                if let Some(sub) = self.get_record(field) {
                    for sub_field in obj.fields() {
                        if !sub.is_present(sub_field) {
                            continue;
                        }
                        let mut value = sub.get_any_string(sub_field, schema);
                        if sub_field.ty.base == BaseType::String {
                            value = format!("\"{}\"", value);
                        }
                        out.push_str(&sub_field.name);
                        out.push_str(": ");
                        out.push_str(&value);
                        out.push_str(", ");
                    }
                }
                out.push('}');
                out
            }
            BaseType::Vector => "[(elements)]".to_string(),
            BaseType::Union => "(union)".to_string(),
            _ => format!("{}", self.get_any_int(field)),
        }
    }
}

/// Mutable view of one record; scalar writes happen in place.
#[derive(Debug)]
pub struct RecordMut<'a> {
    buf: &'a mut [u8],
    loc: usize,
}

impl<'a> RecordMut<'a> {
    pub fn root(buf: &'a mut [u8]) -> Self {
        let loc = layout::root_loc(buf);
        Self { buf, loc }
    }

    pub fn at(buf: &'a mut [u8], loc: usize) -> Self {
        Self { buf, loc }
    }

    pub fn loc(&self) -> usize {
        self.loc
    }

    /// Read-only view of the same record.
    pub fn as_record(&self) -> Record<'_> {
        Record {
            buf: self.buf,
            loc: self.loc,
        }
    }

    fn slot(&self, field: &FieldDef) -> Option<usize> {
        layout::field_loc(self.buf, self.loc, field.offset)
    }

    /// Overwrite an integer-family scalar field. Returns `false` when the
    /// field is absent: an absent field has no storage to write into.
    pub fn set_int<T: IntScalar>(&mut self, field: &FieldDef, value: T) -> bool {
        debug_assert_eq!(
            T::SIZE,
            field.ty.base.size(),
            "scalar width mismatch writing field {}",
            field.name
        );
        match self.slot(field) {
            Some(loc) => {
                T::write_at(self.buf, loc, value);
                true
            }
            None => false,
        }
    }

    /// Overwrite a float-family scalar field. Returns `false` when absent.
    pub fn set_float<T: FloatScalar>(&mut self, field: &FieldDef, value: T) -> bool {
        debug_assert_eq!(
            T::SIZE,
            field.ty.base.size(),
            "scalar width mismatch writing field {}",
            field.name
        );
        match self.slot(field) {
            Some(loc) => {
                T::write_at(self.buf, loc, value);
                true
            }
            None => false,
        }
    }

    typed_setters! {
        ints { bool, u8, i8, u16, i16, u32, i32, u64, i64 }
        floats { f32, f64 }
    }

    /// Write any scalar field from an `i64`, narrowing to the field's
    /// width. String and composite targets are skipped.
    pub fn set_any_int(&mut self, field: &FieldDef, value: i64) {
        match field.ty.base {
            BaseType::UType | BaseType::Bool | BaseType::UByte => {
                self.set_int::<u8>(field, value as u8);
            }
            BaseType::Byte => {
                self.set_int::<i8>(field, value as i8);
            }
            BaseType::Short => {
                self.set_int::<i16>(field, value as i16);
            }
            BaseType::UShort => {
                self.set_int::<u16>(field, value as u16);
            }
            BaseType::Int => {
                self.set_int::<i32>(field, value as i32);
            }
            BaseType::UInt => {
                self.set_int::<u32>(field, value as u32);
            }
            BaseType::Long => {
                self.set_int::<i64>(field, value);
            }
            BaseType::ULong => {
                self.set_int::<u64>(field, value as u64);
            }
            BaseType::Float => {
                self.set_float::<f32>(field, value as f32);
            }
            BaseType::Double => {
                self.set_float::<f64>(field, value as f64);
            }
            _ => {}
        }
    }

    /// Write any scalar field from an `f64`; integer targets truncate.
    pub fn set_any_float(&mut self, field: &FieldDef, value: f64) {
        match field.ty.base {
            BaseType::Float => {
                self.set_float::<f32>(field, value as f32);
            }
            BaseType::Double => {
                self.set_float::<f64>(field, value);
            }
            _ => self.set_any_int(field, value as i64),
        }
    }

    /// Write any scalar field by parsing `value` as a number. Float fields
    /// parse as `f64` and are written exactly once; integer fields parse as
    /// decimal `i64`. String targets stay untouched: growing a stored
    /// string goes through `set_string`, not a field write.
    pub fn set_any_str(&mut self, field: &FieldDef, value: &str) {
        match field.ty.base {
            BaseType::Float | BaseType::Double => {
                self.set_any_float(field, value.trim().parse().unwrap_or(0.0));
            }
            BaseType::String => {}
            _ => self.set_any_int(field, value.trim().parse().unwrap_or(0)),
        }
    }
}

/// Zero-copy view of a vector of inline elements.
#[derive(Debug, Clone, Copy)]
pub struct VectorView<'a, T: Scalar> {
    buf: &'a [u8],
    loc: usize,
    _elem: PhantomData<T>,
}

impl<'a, T: Scalar> VectorView<'a, T> {
    pub fn len(&self) -> u32 {
        layout::len_at(self.buf, self.loc)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loc(&self) -> usize {
        self.loc
    }

    pub fn get(&self, index: u32) -> T {
        debug_assert!(index < self.len());
        T::read_at(
            self.buf,
            self.loc + layout::SIZE_UOFFSET + index as usize * T::SIZE,
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Resolve a union field's payload object from an already-read
/// discriminant value.
///
/// # Panics
///
/// Panics when the discriminant has no enum entry or the entry names no
/// object; both are schema errors, not data errors.
pub fn union_object_for<'s>(
    schema: &'s Schema,
    union_field: &FieldDef,
    discriminant: i64,
) -> &'s ObjectDef {
    let enum_idx = union_field
        .ty
        .index
        .expect("union field has no enum index");
    let enum_def = schema.enum_def(enum_idx);
    let val = enum_def.lookup(discriminant).unwrap_or_else(|| {
        panic!(
            "enum {} has no entry for discriminant {}",
            enum_def.name, discriminant
        )
    });
    let obj_idx = val.object.unwrap_or_else(|| {
        panic!(
            "enum {} entry {} does not reference a payload object",
            enum_def.name, discriminant
        )
    });
    schema.object(obj_idx)
}

/// Resolve the concrete payload object of a union field by reading the
/// `<name>_type` discriminant sibling from the record.
///
/// # Panics
///
/// Panics when the parent object lacks the `<name>_type` sibling field, or
/// when the discriminant resolves to no payload object.
pub fn union_object<'s>(
    schema: &'s Schema,
    parent: &ObjectDef,
    union_field: &FieldDef,
    record: &Record<'_>,
) -> &'s ObjectDef {
    let key = format!("{}_type", union_field.name);
    let tag_field = parent.field(&key).unwrap_or_else(|| {
        panic!(
            "object {} is missing union discriminant field {}",
            parent.name, key
        )
    });
    let tag = record.get_int::<u8>(tag_field);
    union_object_for(schema, union_field, tag as i64)
}
