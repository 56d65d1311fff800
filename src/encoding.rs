//! Encoding optimizer for string objects

use tracing::trace;

use crate::consts::{EMBSTR_SIZE_LIMIT, INT_ENCODING_MAX_LEN, SHARED_INTEGERS};
use crate::object::{
    decr_ref_count, incr_ref_count, Encoding, Obj, ObjectType, StringValue, Value,
};
use crate::server::Server;
use crate::util;

impl Server {
    /// Try to re-encode a string object to save space.
    ///
    /// Returns either the same object (possibly mutated in place) or a
    /// replacement, with the original released. Never fails in a
    /// user-visible way: in the worst case the object comes back unchanged.
    pub fn try_object_encoding(&self, o: Obj) -> Obj {
        // Only strings are re-encoded here; aggregate types pick their own
        // compact representations inside the commands implementing them.
        assert_eq!(
            o.object_type(),
            ObjectType::String,
            "encoding optimizer fed a non-string object"
        );

        if !o.is_sds_encoded() {
            return o;
        }

        // An object observed by more than one owner may surface anywhere in
        // the object space; rewriting it in place is not safe.
        if o.refcount() > 1 {
            return o;
        }

        let (len, parsed) = {
            let value = o.value();
            let bytes = match &*value {
                Value::String(StringValue::Raw(s)) => s.as_bytes(),
                Value::String(StringValue::Embedded(e)) => e.as_bytes(),
                _ => unreachable!("checked sds-encoded above"),
            };
            let parsed = (bytes.len() <= INT_ENCODING_MAX_LEN)
                .then(|| util::bytes_to_i64(bytes))
                .flatten();
            (bytes.len(), parsed)
        };

        if let Some(v) = parsed {
            if self.shared_integers_enabled() && (0..SHARED_INTEGERS as i64).contains(&v) {
                decr_ref_count(o);
                return incr_ref_count(self.shared().integer(v as usize));
            }
            trace!(value = v, "string object re-encoded as int");
            *o.value_mut() = Value::String(StringValue::Int(v));
            return o;
        }

        if len <= EMBSTR_SIZE_LIMIT {
            if o.encoding() == Encoding::Embstr {
                return o;
            }
            let emb = {
                let value = o.value();
                let bytes = match &*value {
                    Value::String(StringValue::Raw(s)) => s.as_bytes(),
                    _ => unreachable!("embedded strings returned above"),
                };
                self.create_embedded_string_object(bytes)
            };
            decr_ref_count(o);
            return emb;
        }

        // Last resort for large raw strings: drop spare buffer capacity
        // when more than 10% of it sits unused.
        if let Value::String(StringValue::Raw(s)) = &mut *o.value_mut() {
            if s.avail() > s.len() / 10 {
                s.remove_free_space();
            }
        }

        o
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::consts::SHARED_REFCOUNT;
    use crate::policy::MaxmemoryPolicy;
    use crate::server::{Config, LibcAllocator};

    fn test_server(config: Config) -> Server {
        Server::with_parts(config, Box::new(ManualClock::new(77)), Box::new(LibcAllocator))
    }

    #[test]
    fn numeric_string_becomes_int() {
        let server = test_server(Config::default());
        let o = server.create_string_object(b"12345");
        assert_eq!(o.encoding(), Encoding::Embstr);

        let o = server.try_object_encoding(o);
        assert_eq!(o.encoding(), Encoding::Int);
        assert!(!o.is_shared());
        o.with_string_bytes(|b| assert_eq!(b, b"12345"));
    }

    #[test]
    fn small_numeric_string_is_interned() {
        let server = test_server(Config::default());
        let o = server.try_object_encoding(server.create_string_object(b"9999"));
        assert_eq!(o.refcount(), SHARED_REFCOUNT);
        assert!(std::rc::Rc::ptr_eq(&o, server.shared().integer(9999)));
    }

    #[test]
    fn interning_is_skipped_under_private_recency_policies() {
        let config = Config {
            maxmemory: 1024 * 1024 * 1024,
            maxmemory_policy: MaxmemoryPolicy::LRU,
            ..Config::default()
        };
        let server = test_server(config);
        let o = server.try_object_encoding(server.create_string_object(b"42"));
        assert_eq!(o.encoding(), Encoding::Int);
        assert_eq!(o.refcount(), 1);
    }

    #[test]
    fn short_raw_string_becomes_embedded() {
        let server = test_server(Config::default());
        let o = server.create_raw_string_object(b"not a number but short");
        let o = server.try_object_encoding(o);
        assert_eq!(o.encoding(), Encoding::Embstr);
        o.with_string_bytes(|b| assert_eq!(b, b"not a number but short"));
    }

    #[test]
    fn shared_owners_block_reencoding() {
        let server = test_server(Config::default());
        let o = server.create_string_object(b"123");
        let second_owner = incr_ref_count(&o);
        let o = server.try_object_encoding(o);
        assert_eq!(o.encoding(), Encoding::Embstr);
        decr_ref_count(second_owner);
    }

    #[test]
    fn oversized_raw_buffer_is_trimmed() {
        let server = test_server(Config::default());
        let padded = vec![b'x'; 60];
        let o = server.create_raw_string_object(&padded);
        if let Value::String(StringValue::Raw(s)) = &mut *o.value_mut() {
            s.reserve(100);
            assert!(s.avail() > 6);
        }
        let o = server.try_object_encoding(o);
        assert_eq!(o.encoding(), Encoding::Raw);
        let avail = if let Value::String(StringValue::Raw(s)) = &*o.value() {
            s.avail()
        } else {
            panic!("expected Raw string value")
        };
        assert_eq!(avail, 0);
    }

    #[test]
    fn second_application_is_a_fixed_point() {
        let server = test_server(Config::default());
        for input in [&b"12345"[..], b"short text", b"9"] {
            let once = server.try_object_encoding(server.create_string_object(input));
            let encoding = once.encoding();
            let refcount = once.refcount();
            let twice = server.try_object_encoding(once);
            assert_eq!(twice.encoding(), encoding);
            assert_eq!(twice.refcount(), refcount);
        }
    }
}
