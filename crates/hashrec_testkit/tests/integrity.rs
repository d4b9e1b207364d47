//! Digest checks on read and the three corruption policies.

use hashrec_core::{
    stamp, verify, CoreError, CorruptionPolicy, HashAlgorithm, RecordStatus, Settings, Value,
    Verification, DIGEST_FIELD,
};
use hashrec_testkit::prelude::*;

fn seeded(ctx: &TestContext) -> std::sync::Arc<hashrec_core::Schema> {
    let model = ctx.test_model();
    for (id, attr2) in [("a", 1), ("b", 2), ("c", 3)] {
        ctx.db
            .add(&mut test_record(&model, id, attr2, 1.5), false)
            .unwrap();
    }
    model
}

#[test]
fn untouched_records_are_valid() {
    let ctx = TestContext::new();
    let model = seeded(&ctx);
    let all = ctx.db.get(&model, CorruptionPolicy::Flag).unwrap();
    assert_eq!(all.len(), 3);
    assert!(!all.has_corrupted());
    assert!(all.report().is_empty());
}

#[test]
fn flag_keeps_the_record_and_hides_its_values() {
    init_test_tracing();
    let ctx = TestContext::new();
    let model = seeded(&ctx);
    ctx.tamper(15, "hashrec:testmodel:b", "attr3", "9.5");

    let all = ctx.db.get(&model, CorruptionPolicy::Flag).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.report(), vec![Value::from("b")]);

    let b = &all.records()[1];
    assert_eq!(b.status(), RecordStatus::Corrupt);
    assert_eq!(b.id(), Some(&Value::from("b")));
    assert_eq!(b.get("attr2"), Some(&Value::Corrupted));
    assert_eq!(b.get("attr3"), Some(&Value::Corrupted));

    assert_eq!(all.valid_only().unwrap().len(), 2);
    assert!(matches!(
        all.filter_by([("attr1", "b")]),
        Err(CoreError::CorruptRecord { .. })
    ));
}

#[test]
fn skip_drops_the_record() {
    let ctx = TestContext::new();
    let model = seeded(&ctx);
    ctx.tamper(15, "hashrec:testmodel:a", "attr2", "100");

    let all = ctx.db.get(&model, CorruptionPolicy::Skip).unwrap();
    let ids: Vec<_> = all.iter().filter_map(|r| r.id().cloned()).collect();
    assert_eq!(ids, vec![Value::from("b"), Value::from("c")]);
}

#[test]
fn ignore_returns_the_stored_values() {
    let ctx = TestContext::new();
    let model = seeded(&ctx);
    ctx.tamper(15, "hashrec:testmodel:c", "attr2", "100");

    let all = ctx.db.get(&model, CorruptionPolicy::Ignore).unwrap();
    assert!(!all.has_corrupted());
    let c = all.last(None).unwrap().unwrap();
    assert_eq!(c.get("attr2"), Some(&Value::from(100)));
}

#[test]
fn a_missing_digest_counts_as_corrupt() {
    let ctx = TestContext::new();
    let model = ctx.test_model();
    ctx.raw(15)
        .hset(
            "hashrec:testmodel:z",
            &[
                ("attr1".to_string(), "z".to_string()),
                ("attr2".to_string(), "1".to_string()),
                ("attr3".to_string(), "1.0".to_string()),
            ],
        )
        .unwrap();

    let all = ctx.db.get(&model, CorruptionPolicy::Flag).unwrap();
    assert_eq!(all.report(), vec![Value::from("z")]);
    assert!(ctx.db.get(&model, CorruptionPolicy::Skip).unwrap().is_empty());
}

#[test]
fn unparseable_fields_decode_as_corrupted() {
    let ctx = TestContext::new();
    let model = seeded(&ctx);
    ctx.tamper(15, "hashrec:testmodel:a", "attr2", "twelve");

    let all = ctx.db.get(&model, CorruptionPolicy::Ignore).unwrap();
    assert_eq!(all.records()[0].get("attr2"), Some(&Value::Corrupted));
}

#[test]
fn stored_digest_matches_the_public_stamp() {
    for algorithm in [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ] {
        let ctx = TestContext::with_settings(Settings::new().hash_algorithm(algorithm));
        let model = ctx.test_model();
        let mut record = test_record(&model, "a", 1, 2.0);
        ctx.db.add(&mut record, false).unwrap();

        let key = "hashrec:testmodel:a";
        let mut raw = ctx.raw(15).hgetall(key).unwrap();
        assert_eq!(verify(key, &raw, algorithm), Verification::Valid);
        assert_eq!(raw.get(DIGEST_FIELD).map(String::as_str), record.digest());

        let digest = raw.remove(DIGEST_FIELD).unwrap();
        assert_eq!(stamp(key, &raw, algorithm), digest);
    }
}
