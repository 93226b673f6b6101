//! # Schema Descriptor Graph
//!
//! In-memory description of the record types a buffer may contain. The
//! schema drives every reflective operation: field lookup, union
//! resolution, the resize walk and the deep-copy walk.
//!
//! Lookup structures are pre-computed at construction, in the same spirit
//! as pre-computing column offsets: object names index into a map, fields
//! are kept sorted by name for binary search, enum values sorted by
//! discriminant.

use eyre::{ensure, Result};
use hashbrown::HashMap;

use crate::types::{BaseType, TypeRef};

/// One field of an object. For table objects `offset` is the field's slot
/// position inside the vtable (4, 6, 8, ...); for struct objects it is the
/// fixed byte offset of the member inside the struct.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub offset: u16,
    pub ty: TypeRef,
    pub default_integer: i64,
    pub default_real: f64,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, offset: u16, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            offset,
            ty,
            default_integer: 0,
            default_real: 0.0,
        }
    }

    pub fn with_default_integer(mut self, default: i64) -> Self {
        self.default_integer = default;
        self
    }

    pub fn with_default_real(mut self, default: f64) -> Self {
        self.default_real = default;
        self
    }
}

/// A record type: either a table (vtable-indirected, fields optional) or a
/// struct (fixed shape, stored inline in its parent).
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name: String,
    pub is_struct: bool,
    pub minalign: usize,
    pub bytesize: usize,
    fields: Vec<FieldDef>,
}

impl ObjectDef {
    pub fn table(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        let mut fields = fields;
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: name.into(),
            is_struct: false,
            minalign: 1,
            bytesize: 0,
            fields,
        }
    }

    pub fn struct_def(
        name: impl Into<String>,
        minalign: usize,
        bytesize: usize,
        fields: Vec<FieldDef>,
    ) -> Self {
        let mut fields = fields;
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: name.into(),
            is_struct: true,
            minalign,
            bytesize,
            fields,
        }
    }

    /// Fields in name order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.fields[i])
    }
}

/// One entry of a union's discriminant enum, mapping a discriminant value
/// to the object describing the payload. Entries without an object (the
/// customary `NONE` member) carry `object: None`.
#[derive(Debug, Clone)]
pub struct EnumVal {
    pub value: i64,
    pub object: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    values: Vec<EnumVal>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, values: Vec<EnumVal>) -> Self {
        let mut values = values;
        values.sort_by_key(|v| v.value);
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn values(&self) -> &[EnumVal] {
        &self.values
    }

    pub fn lookup(&self, discriminant: i64) -> Option<&EnumVal> {
        self.values
            .binary_search_by_key(&discriminant, |v| v.value)
            .ok()
            .map(|i| &self.values[i])
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    objects: Vec<ObjectDef>,
    enums: Vec<EnumDef>,
    root: usize,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Validates every cross-reference in the graph so later walks can
    /// index without re-checking.
    pub fn new(objects: Vec<ObjectDef>, enums: Vec<EnumDef>, root: usize) -> Result<Self> {
        ensure!(
            root < objects.len(),
            "root object index {} out of range ({} objects)",
            root,
            objects.len()
        );
        ensure!(
            !objects[root].is_struct,
            "root object {} must be a table",
            objects[root].name
        );

        let mut by_name = HashMap::with_capacity(objects.len());
        for (i, obj) in objects.iter().enumerate() {
            ensure!(
                by_name.insert(obj.name.clone(), i).is_none(),
                "duplicate object name {}",
                obj.name
            );
        }

        for obj in &objects {
            if obj.is_struct {
                ensure!(
                    obj.minalign >= 1 && obj.bytesize >= 1,
                    "struct {} needs a nonzero alignment and size",
                    obj.name
                );
            }
            for field in obj.fields() {
                ensure!(
                    field.ty.base != BaseType::None,
                    "field {}.{} has no type",
                    obj.name,
                    field.name
                );
                match field.ty.base {
                    BaseType::Obj => {
                        check_index(field.ty.index, objects.len(), obj, field)?;
                    }
                    BaseType::Union => {
                        check_index(field.ty.index, enums.len(), obj, field)?;
                    }
                    BaseType::Vector if field.ty.element == BaseType::Obj => {
                        check_index(field.ty.index, objects.len(), obj, field)?;
                    }
                    _ => {}
                }
                if !obj.is_struct {
                    ensure!(
                        field.offset >= 4 && field.offset % 2 == 0,
                        "field {}.{} has invalid vtable offset {}",
                        obj.name,
                        field.name,
                        field.offset
                    );
                }
            }
        }

        for en in &enums {
            for val in en.values() {
                if let Some(idx) = val.object {
                    ensure!(
                        idx < objects.len(),
                        "enum {} value {} references object index {} out of range",
                        en.name,
                        val.value,
                        idx
                    );
                }
            }
        }

        Ok(Self {
            objects,
            enums,
            root,
            by_name,
        })
    }

    pub fn object(&self, index: usize) -> &ObjectDef {
        &self.objects[index]
    }

    pub fn objects(&self) -> &[ObjectDef] {
        &self.objects
    }

    pub fn enum_def(&self, index: usize) -> &EnumDef {
        &self.enums[index]
    }

    pub fn root_object(&self) -> &ObjectDef {
        &self.objects[self.root]
    }

    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn object_named(&self, name: &str) -> Option<&ObjectDef> {
        self.by_name.get(name).map(|&i| &self.objects[i])
    }

    pub fn object_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

fn check_index(
    index: Option<usize>,
    len: usize,
    obj: &ObjectDef,
    field: &FieldDef,
) -> Result<usize> {
    let idx = index.ok_or_else(|| {
        eyre::eyre!(
            "field {}.{} of type {:?} has no schema index",
            obj.name,
            field.name,
            field.ty.base
        )
    })?;
    ensure!(
        idx < len,
        "field {}.{} references schema index {} out of range ({})",
        obj.name,
        field.name,
        idx,
        len
    );
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;

    fn point_object() -> ObjectDef {
        ObjectDef::table(
            "Pt",
            vec![
                FieldDef::new("y", 6, TypeRef::scalar(BaseType::Int)),
                FieldDef::new("x", 4, TypeRef::scalar(BaseType::Int)),
            ],
        )
    }

    #[test]
    fn field_lookup_is_name_ordered() {
        let obj = point_object();
        assert_eq!(obj.field("x").unwrap().offset, 4);
        assert_eq!(obj.field("y").unwrap().offset, 6);
        assert!(obj.field("z").is_none());
        assert_eq!(obj.fields()[0].name, "x");
    }

    #[test]
    fn enum_lookup_by_discriminant() {
        let en = EnumDef::new(
            "Shape",
            vec![
                EnumVal {
                    value: 2,
                    object: Some(1),
                },
                EnumVal {
                    value: 0,
                    object: None,
                },
                EnumVal {
                    value: 1,
                    object: Some(0),
                },
            ],
        );
        assert_eq!(en.lookup(1).unwrap().object, Some(0));
        assert_eq!(en.lookup(2).unwrap().object, Some(1));
        assert!(en.lookup(7).is_none());
    }

    #[test]
    fn schema_rejects_out_of_range_root() {
        let result = Schema::new(vec![point_object()], vec![], 3);
        assert!(result.is_err());
    }

    #[test]
    fn schema_rejects_dangling_object_reference() {
        let holder = ObjectDef::table("Holder", vec![FieldDef::new("pt", 4, TypeRef::obj(9))]);
        let result = Schema::new(vec![holder], vec![], 0);
        assert!(result.is_err());
    }

    #[test]
    fn schema_rejects_struct_root() {
        let st = ObjectDef::struct_def("Vec2", 4, 8, vec![]);
        let result = Schema::new(vec![st], vec![], 0);
        assert!(result.is_err());
    }

    #[test]
    fn schema_indexes_objects_by_name() {
        let schema = Schema::new(vec![point_object()], vec![], 0).unwrap();
        assert_eq!(schema.object_index("Pt"), Some(0));
        assert!(schema.object_named("Missing").is_none());
        assert_eq!(schema.root_object().name, "Pt");
    }
}
