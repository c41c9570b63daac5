//! `errors` shims.

use crate::bridge::RegistryBuilder;
use crate::value::Value;

pub fn register(b: &mut RegistryBuilder) {
    b.func1("errors.New", |text: String| Value::error(text));
}
