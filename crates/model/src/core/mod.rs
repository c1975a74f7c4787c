pub mod type_class;
pub mod value;
