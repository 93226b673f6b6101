//! # Internal Macros
//!
//! Accessor-generation macros for the record views. Each scalar width gets
//! a named getter/setter wrapper over the generic `get_int`/`get_float` and
//! `set_int`/`set_float` entry points, so call sites that know their field
//! type statically do not have to spell out turbofish generics.
//!
//! ```ignore
//! impl Record<'_> {
//!     typed_getters! {
//!         ints { bool, u8, i16, i32 }
//!         floats { f32, f64 }
//!     }
//! }
//!
//! // Generates:
//! // pub fn get_bool(&self, field: &FieldDef) -> bool { self.get_int::<bool>(field) }
//! // pub fn get_f64(&self, field: &FieldDef) -> f64 { self.get_float::<f64>(field) }
//! // ...
//! ```

/// Generates `get_<ty>` wrappers for the listed integer and float widths.
#[macro_export]
macro_rules! typed_getters {
    (ints { $($int:ident),* $(,)? } floats { $($float:ident),* $(,)? }) => {
        $(
            ::paste::paste! {
                #[inline]
                pub fn [<get_ $int>](&self, field: &$crate::schema::FieldDef) -> $int {
                    self.get_int::<$int>(field)
                }
            }
        )*
        $(
            ::paste::paste! {
                #[inline]
                pub fn [<get_ $float>](&self, field: &$crate::schema::FieldDef) -> $float {
                    self.get_float::<$float>(field)
                }
            }
        )*
    };
}

/// Generates `set_<ty>` wrappers for the listed integer and float widths.
/// Each returns `false` when the field is absent from the record.
#[macro_export]
macro_rules! typed_setters {
    (ints { $($int:ident),* $(,)? } floats { $($float:ident),* $(,)? }) => {
        $(
            ::paste::paste! {
                #[inline]
                pub fn [<set_ $int>](&mut self, field: &$crate::schema::FieldDef, value: $int) -> bool {
                    self.set_int::<$int>(field, value)
                }
            }
        )*
        $(
            ::paste::paste! {
                #[inline]
                pub fn [<set_ $float>](&mut self, field: &$crate::schema::FieldDef, value: $float) -> bool {
                    self.set_float::<$float>(field, value)
                }
            }
        )*
    };
}
