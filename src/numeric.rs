//! Numeric extraction from string objects

use crate::error::ObjectError;
use crate::object::{Object, ObjectType, StringValue, Value};
use crate::reply::Reply;
use crate::util;

fn assert_string(o: &Object) {
    assert_eq!(
        o.object_type(),
        ObjectType::String,
        "numeric extraction from a non-string object"
    );
}

/// Interpret the object as an exact signed 64-bit integer.
///
/// Integer payloads are read straight from the payload slot; string
/// payloads must spell a canonical decimal integer over the whole buffer.
pub fn get_long_long_from_object(o: &Object) -> Result<i64, ObjectError> {
    assert_string(o);
    match &*o.value() {
        Value::String(StringValue::Int(v)) => Ok(*v),
        Value::String(StringValue::Raw(s)) => {
            util::bytes_to_i64(s.as_bytes()).ok_or(ObjectError::NotAnInteger)
        }
        Value::String(StringValue::Embedded(e)) => {
            util::bytes_to_i64(e.as_bytes()).ok_or(ObjectError::NotAnInteger)
        }
        _ => unreachable!("string type asserted above"),
    }
}

/// Interpret the object as a double. Leading whitespace, trailing garbage
/// and `NaN` are rejected; explicit infinities are allowed.
pub fn get_double_from_object(o: &Object) -> Result<f64, ObjectError> {
    assert_string(o);
    match &*o.value() {
        Value::String(StringValue::Int(v)) => Ok(*v as f64),
        Value::String(StringValue::Raw(s)) => {
            util::bytes_to_f64(s.as_bytes()).ok_or(ObjectError::NotAFloat)
        }
        Value::String(StringValue::Embedded(e)) => {
            util::bytes_to_f64(e.as_bytes()).ok_or(ObjectError::NotAFloat)
        }
        _ => unreachable!("string type asserted above"),
    }
}

/// Interpret the object as the widest float the platform offers. The
/// grammar matches [`get_double_from_object`].
pub fn get_long_double_from_object(o: &Object) -> Result<f64, ObjectError> {
    get_double_from_object(o)
}

/// [`get_long_long_from_object`], reporting failure on the reply channel.
/// `msg` overrides the canned error text.
pub fn get_long_long_from_object_or_reply(
    reply: &mut dyn Reply,
    o: &Object,
    msg: Option<&str>,
) -> Result<i64, ObjectError> {
    get_long_long_from_object(o).map_err(|e| {
        reply_extraction_error(reply, e, msg);
        e
    })
}

/// [`get_double_from_object`], reporting failure on the reply channel.
pub fn get_double_from_object_or_reply(
    reply: &mut dyn Reply,
    o: &Object,
    msg: Option<&str>,
) -> Result<f64, ObjectError> {
    get_double_from_object(o).map_err(|e| {
        reply_extraction_error(reply, e, msg);
        e
    })
}

/// [`get_long_double_from_object`], reporting failure on the reply channel.
pub fn get_long_double_from_object_or_reply(
    reply: &mut dyn Reply,
    o: &Object,
    msg: Option<&str>,
) -> Result<f64, ObjectError> {
    get_long_double_from_object(o).map_err(|e| {
        reply_extraction_error(reply, e, msg);
        e
    })
}

fn reply_extraction_error(reply: &mut dyn Reply, e: ObjectError, msg: Option<&str>) {
    match msg {
        Some(text) => reply.error(text),
        None => reply.error(&e.to_string()),
    }
}
