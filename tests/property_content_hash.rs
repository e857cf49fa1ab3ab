//! Property tests for the content-hash and validation laws.

use proptest::prelude::*;
use serde_json::{json, Value};

use noesis::domain::models::schema::ValueSchema;
use noesis::infrastructure::hashing::{canonical_json_bytes, content_hash, generate_cache_key};
use noesis::services::validate::Validator;

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z0-9 ]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Identical (namespace, payload) always hashes identically.
    #[test]
    fn hash_is_deterministic(payload in arb_json(), ns in "[a-z_]{1,12}") {
        prop_assert_eq!(
            generate_cache_key(&ns, &payload),
            generate_cache_key(&ns, &payload)
        );
    }

    /// Reformatting (serialize, reparse) never changes the hash:
    /// whitespace and representation are canonicalized away.
    #[test]
    fn hash_survives_a_serialization_round_trip(payload in arb_json()) {
        let pretty = serde_json::to_string_pretty(&payload).unwrap();
        let reparsed: Value = serde_json::from_str(&pretty).unwrap();
        prop_assert_eq!(
            generate_cache_key("ns", &payload),
            generate_cache_key("ns", &reparsed)
        );
    }

    /// Distinct namespaces never alias, whatever the payload.
    #[test]
    fn namespaces_partition_the_key_space(payload in arb_json()) {
        prop_assert_ne!(
            generate_cache_key("embeddings", &payload),
            generate_cache_key("classifications", &payload)
        );
    }

    /// Equal canonical bytes iff equal keys.
    #[test]
    fn keys_agree_with_canonical_bytes(a in arb_json(), b in arb_json()) {
        let same_canonical = canonical_json_bytes(&a) == canonical_json_bytes(&b);
        let same_key = generate_cache_key("t", &a) == generate_cache_key("t", &b);
        prop_assert_eq!(same_canonical, same_key);
    }

    /// Namespace length-prefixing keeps boundary shifts distinct.
    #[test]
    fn namespace_boundaries_do_not_shift(ns in "[a-z]{2,8}", tail in "[a-z]{1,8}") {
        let joined = format!("{ns}{tail}");
        prop_assert_ne!(
            content_hash(&joined, b"x"),
            content_hash(&ns, format!("{tail}x").as_bytes())
        );
    }

    /// Validation is idempotent: a validated value revalidates to itself.
    #[test]
    fn validation_is_idempotent(attempts in 0i64..10, job in "[A-Z]{1,3}[0-9]{1,4}") {
        let schema = ValueSchema::record(
            [
                ("job_id".to_string(), ValueSchema::text()),
                ("attempts".to_string(), ValueSchema::Integer { min: Some(0), max: Some(10) }),
            ],
            vec!["job_id".to_string()],
        );
        let input = json!({ "job_id": job, "attempts": attempts.to_string() });
        let once = Validator::validate(input, &schema).unwrap();
        let twice = Validator::validate(once.clone(), &schema).unwrap();
        prop_assert_eq!(once, twice);
    }
}
