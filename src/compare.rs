//! String object comparators

use std::cmp::Ordering;
use std::ffi::CString;

use crate::object::{Object, ObjectType, StringValue, Value};

fn assert_strings(a: &Object, b: &Object) {
    assert!(
        a.object_type() == ObjectType::String && b.object_type() == ObjectType::String,
        "comparison of non-string objects"
    );
}

/// Binary-safe comparison: lexicographic byte order, with the longer string
/// greater when one is a prefix of the other. Integer payloads are rendered
/// to a stack buffer rather than decoded through a fresh object.
pub fn compare_string_objects(a: &Object, b: &Object) -> Ordering {
    assert_strings(a, b);
    if std::ptr::eq(a, b) {
        return Ordering::Equal;
    }
    a.with_string_bytes(|ab| b.with_string_bytes(|bb| ab.cmp(bb)))
}

/// Locale-aware comparison via `strcoll`. Binary contents are compared up
/// to the first NUL, which is what the C collation functions see anyway.
pub fn collate_string_objects(a: &Object, b: &Object) -> Ordering {
    assert_strings(a, b);
    if std::ptr::eq(a, b) {
        return Ordering::Equal;
    }
    let ca = a.with_string_bytes(to_c_string);
    let cb = b.with_string_bytes(to_c_string);
    let r = unsafe { libc::strcoll(ca.as_ptr(), cb.as_ptr()) };
    r.cmp(&0)
}

/// String equality. Two integer payloads are compared directly, skipping
/// any rendering.
pub fn equal_string_objects(a: &Object, b: &Object) -> bool {
    if let (Value::String(StringValue::Int(x)), Value::String(StringValue::Int(y))) =
        (&*a.value(), &*b.value())
    {
        return x == y;
    }
    compare_string_objects(a, b) == Ordering::Equal
}

fn to_c_string(bytes: &[u8]) -> CString {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    CString::new(&bytes[..end]).expect("interior NULs stripped")
}
