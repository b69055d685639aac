//! Integration tests for the six literal scenarios and exercising
//! convergence across independently-diverged replicas.

use maplit::btreemap;
use test_log::test;

use inkweave::{
    get_text_with_formatting, ActorId, InputOperation, MarkMap, MarkType, ObjId, OpId, Replica,
    ReplicaOpts,
};

fn text_of(spans: &[(String, MarkMap)]) -> String {
    spans.iter().map(|(t, _)| t.as_str()).collect()
}

fn new_text_replica(actor: &str) -> Replica {
    Replica::new(ReplicaOpts {
        actor: Some(ActorId::from(actor)),
    })
}

/// Seed two replicas with identical initial text, each under its own actor,
/// by building the document on one and replaying the same changes onto the
/// other — the two then diverge independently from there.
fn seeded(initial: &str) -> (Replica, Replica, ObjId) {
    let mut r1 = new_text_replica("seed-1");
    let (make_change, _) = r1
        .change(vec![InputOperation::MakeList { obj: ObjId::Root, key: "text".into() }])
        .unwrap();
    let obj = ObjId::Id(OpId::new(make_change.start_op, r1.actor().clone()));
    let (insert_change, _) = r1
        .change(vec![InputOperation::Insert { obj: obj.clone(), index: 0, text: initial.into() }])
        .unwrap();

    let mut r2 = new_text_replica("seed-2");
    r2.apply_change(make_change).unwrap();
    r2.apply_change(insert_change).unwrap();

    (r1, r2, obj)
}

#[test]
fn concurrent_delete_then_insert_merges_with_concurrent_insert() {
    let (mut r1, mut r2, obj) = seeded("abrxabra");

    let (del, _) = r1
        .change(vec![InputOperation::Delete { obj: obj.clone(), index: 3, count: 1 }])
        .unwrap();
    let (ins, _) = r1
        .change(vec![InputOperation::Insert { obj: obj.clone(), index: 4, text: "ca".into() }])
        .unwrap();
    let (r2_ins, _) = r2
        .change(vec![InputOperation::Insert { obj: obj.clone(), index: 5, text: "da".into() }])
        .unwrap();

    r1.apply_change(r2_ins).unwrap();
    r2.apply_change(del).unwrap();
    r2.apply_change(ins).unwrap();

    let text1 = text_of(&get_text_with_formatting(&r1, &obj).unwrap());
    let text2 = text_of(&get_text_with_formatting(&r2, &obj).unwrap());
    assert_eq!(text1, "abracadabra");
    assert_eq!(text2, "abracadabra");
}

#[test]
fn overlapping_bold_and_italic_produce_three_spans() {
    let (mut r1, mut r2, obj) = seeded("The Peritext editor");

    let (strong_change, _) = r1
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Strong,
            start_index: 0,
            end_index: 12,
            attrs: None,
        }])
        .unwrap();
    let (em_change, _) = r2
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Em,
            start_index: 4,
            end_index: 19,
            attrs: None,
        }])
        .unwrap();

    r1.apply_change(em_change).unwrap();
    r2.apply_change(strong_change).unwrap();

    for replica in [&r1, &r2] {
        let spans = get_text_with_formatting(replica, &obj).unwrap();
        let rendered: Vec<(&str, bool, bool)> =
            spans.iter().map(|(t, m)| (t.as_str(), m.strong, m.em)).collect();
        assert_eq!(
            rendered,
            vec![("The ", true, false), ("Peritext", true, true), (" editor", false, true)]
        );
    }
}

#[test]
fn insertion_at_bold_boundary_with_non_inclusive_narrowing() {
    let (mut r1, mut r2, obj) = seeded("AC");

    let (add, _) = r1
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Strong,
            start_index: 0,
            end_index: 2,
            attrs: None,
        }])
        .unwrap();
    let (remove, _) = r1
        .change(vec![InputOperation::RemoveMark {
            obj: obj.clone(),
            mark_type: MarkType::Strong,
            start_index: 1,
            end_index: 2,
            attrs: None,
        }])
        .unwrap();
    let (insert_b, _) = r2
        .change(vec![InputOperation::Insert { obj: obj.clone(), index: 1, text: "B".into() }])
        .unwrap();

    r1.apply_change(insert_b).unwrap();
    r2.apply_change(add).unwrap();
    r2.apply_change(remove).unwrap();

    for replica in [&r1, &r2] {
        let spans = get_text_with_formatting(replica, &obj).unwrap();
        let rendered: Vec<(&str, bool)> = spans.iter().map(|(t, m)| (t.as_str(), m.strong)).collect();
        assert_eq!(rendered, vec![("AB", true), ("C", false)]);
    }
}

#[test]
fn overlapping_comments_are_independent_and_sorted() {
    let (mut r1, mut r2, obj) = seeded("hello world");

    let (c1, _) = r1
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Comment,
            start_index: 0,
            end_index: 6,
            attrs: Some(btreemap! { "id".to_string() => "abc-123".to_string() }),
        }])
        .unwrap();

    let (c2, _) = r2
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Comment,
            start_index: 3,
            end_index: 9,
            attrs: Some(btreemap! { "id".to_string() => "def-789".to_string() }),
        }])
        .unwrap();

    r1.apply_change(c2).unwrap();
    r2.apply_change(c1).unwrap();

    for replica in [&r1, &r2] {
        let spans = get_text_with_formatting(replica, &obj).unwrap();
        let rendered: Vec<(&str, Vec<&str>)> = spans
            .iter()
            .map(|(t, m)| (t.as_str(), m.comments.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("hel", vec!["abc-123"]),
                ("lo ", vec!["abc-123", "def-789"]),
                ("wor", vec!["def-789"]),
                ("ld", vec![]),
            ]
        );
    }
}

#[test]
fn concurrent_links_resolve_to_the_same_deterministic_winner() {
    let (mut r1, mut r2, obj) = seeded("hello");

    let (l1, _) = r1
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Link,
            start_index: 0,
            end_index: 5,
            attrs: Some(btreemap! { "url".to_string() => "u1".to_string() }),
        }])
        .unwrap();

    let (l2, _) = r2
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Link,
            start_index: 0,
            end_index: 5,
            attrs: Some(btreemap! { "url".to_string() => "u2".to_string() }),
        }])
        .unwrap();

    r1.apply_change(l2).unwrap();
    r2.apply_change(l1).unwrap();

    let winner1 = get_text_with_formatting(&r1, &obj).unwrap()[0].1.link.clone();
    let winner2 = get_text_with_formatting(&r2, &obj).unwrap()[0].1.link.clone();
    assert!(winner1 == Some("u1".to_string()) || winner1 == Some("u2".to_string()));
    assert_eq!(winner1, winner2, "both replicas must agree on the same winner");
}

#[test]
fn boundary_that_becomes_a_tombstone_still_anchors_inserted_text() {
    let (mut r1, mut r2, obj) = seeded("The *Peritext* editor");

    let (mark, _) = r1
        .change(vec![InputOperation::AddMark {
            obj: obj.clone(),
            mark_type: MarkType::Strong,
            start_index: 4,
            end_index: 14,
            attrs: None,
        }])
        .unwrap();
    let (del1, _) = r1
        .change(vec![InputOperation::Delete { obj: obj.clone(), index: 4, count: 1 }])
        .unwrap();
    let (del2, _) = r1
        .change(vec![InputOperation::Delete { obj: obj.clone(), index: 12, count: 1 }])
        .unwrap();

    let (ins1, _) = r2
        .change(vec![InputOperation::Insert { obj: obj.clone(), index: 5, text: "_".into() }])
        .unwrap();
    // `ins1` already shifted everything from the original index 13 (the
    // second asterisk) forward by one, so "right after the second
    // asterisk" is now current index 15, not the original document's 14.
    let (ins2, _) = r2
        .change(vec![InputOperation::Insert { obj: obj.clone(), index: 15, text: "_".into() }])
        .unwrap();

    r1.apply_change(ins1).unwrap();
    r1.apply_change(ins2).unwrap();
    r2.apply_change(mark).unwrap();
    r2.apply_change(del1).unwrap();
    r2.apply_change(del2).unwrap();

    for replica in [&r1, &r2] {
        let spans = get_text_with_formatting(replica, &obj).unwrap();
        let rendered: Vec<(&str, bool)> = spans.iter().map(|(t, m)| (t.as_str(), m.strong)).collect();
        assert_eq!(rendered, vec![("The ", false), ("_Peritext_", true), (" editor", false)]);
    }
}
