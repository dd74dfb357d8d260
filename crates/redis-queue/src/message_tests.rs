//! Tests for message types.

use super::*;
use crate::score::Priority;
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// QueueName Tests
// ============================================================================

#[test]
fn test_queue_name_validation() {
    // Valid names
    assert!(QueueName::new("default_queue".to_string()).is_ok());
    assert!(QueueName::new("my_cpp_queue".to_string()).is_ok());
    assert!(QueueName::new("jobs:completed".to_string()).is_ok());
    assert!(QueueName::new("a".to_string()).is_ok());

    // Invalid names
    assert!(QueueName::new("".to_string()).is_err());
    assert!(QueueName::new("a".repeat(261)).is_err());
    assert!(QueueName::new(":leading".to_string()).is_err());
    assert!(QueueName::new("trailing-".to_string()).is_err());
    assert!(QueueName::new("white space".to_string()).is_err());
    assert!(QueueName::new("special@chars".to_string()).is_err());
}

#[test]
fn test_queue_name_suffix() {
    let queue = QueueName::new("orders".to_string()).unwrap();
    let completed = queue.with_suffix("completed").unwrap();
    assert_eq!(completed.as_str(), "orders:completed");
}

// ============================================================================
// MessageId / IdGenerator Tests
// ============================================================================

#[test]
fn test_message_id_parsing() {
    assert!("1700000000-3".parse::<MessageId>().is_ok());
    assert!("".parse::<MessageId>().is_err());
    assert!("bad:id".parse::<MessageId>().is_err());
}

#[test]
fn test_generated_id_shape() {
    let generator = IdGenerator::new();
    let before = Utc::now().timestamp();
    let id = generator.generate();
    let after = Utc::now().timestamp();

    let timestamp = id.timestamp_secs().expect("timestamp component");
    assert!(timestamp >= before && timestamp <= after);
    assert_eq!(id.counter(), Some(0));
    assert!(!id.as_str().contains(WIRE_DELIMITER));
}

#[test]
fn test_generated_ids_are_distinct_and_increasing() {
    let generator = IdGenerator::new();
    let ids: Vec<MessageId> = (0..1000).map(|_| generator.generate()).collect();

    let distinct: HashSet<&MessageId> = ids.iter().collect();
    assert_eq!(distinct.len(), ids.len());

    for pair in ids.windows(2) {
        let earlier = pair[0].sequence_key().unwrap();
        let later = pair[1].sequence_key().unwrap();
        assert!(earlier < later, "{} should sort before {}", pair[0], pair[1]);
    }
    assert_eq!(generator.generated(), 1000);
}

#[test]
fn test_salted_ids_differ_between_instances() {
    let a = IdGenerator::with_salt(InstanceSalt::new("producer_a".to_string()).unwrap());
    let b = IdGenerator::with_salt(InstanceSalt::new("producer_b".to_string()).unwrap());

    let id_a = a.generate();
    let id_b = b.generate();

    assert_ne!(id_a, id_b);
    assert!(id_a.as_str().ends_with("-producer_a"));
    assert_eq!(id_a.counter(), Some(0));
    assert_eq!(id_b.counter(), Some(0));
}

#[test]
fn test_instance_salt_validation() {
    assert!(InstanceSalt::new("worker_7".to_string()).is_ok());
    assert!(InstanceSalt::new("".to_string()).is_err());
    assert!(InstanceSalt::new("has:colon".to_string()).is_err());
    assert!(InstanceSalt::new("has-dash".to_string()).is_err());
    assert!(InstanceSalt::new("x".repeat(65)).is_err());
}

#[test]
fn test_shared_generator_never_repeats() {
    let generator = Arc::new(IdGenerator::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let generator = Arc::clone(&generator);
            std::thread::spawn(move || (0..250).map(|_| generator.generate()).collect::<Vec<_>>())
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id), "Duplicate id generated");
        }
    }
    assert_eq!(all.len(), 1000);
}

#[test]
fn test_shared_generator_timestamps_follow_counter() {
    let generator = Arc::new(IdGenerator::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let generator = Arc::clone(&generator);
            std::thread::spawn(move || (0..500).map(|_| generator.generate()).collect::<Vec<_>>())
        })
        .collect();

    let mut ids: Vec<MessageId> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    ids.sort_by_key(|id| id.counter().unwrap());

    for pair in ids.windows(2) {
        assert!(
            pair[0].timestamp_secs().unwrap() <= pair[1].timestamp_secs().unwrap(),
            "{} was generated before {} but carries a later timestamp",
            pair[0],
            pair[1]
        );
    }
}

// ============================================================================
// Wire Encoding Tests
// ============================================================================

#[test]
fn test_encode_decode_round_trip() {
    let generator = IdGenerator::new();
    for payload in ["hello", "", "a:b:c", "{\"json\":true}", "ünïcødé"] {
        let id = generator.generate();
        let (decoded_id, decoded_payload) = decode(&encode(&id, payload)).unwrap();
        assert_eq!(decoded_id, id);
        assert_eq!(decoded_payload, payload);
    }
}

#[test]
fn test_encode_layout() {
    let id: MessageId = "1700000000-5".parse().unwrap();
    assert_eq!(encode(&id, "payload"), "1700000000-5:payload");
}

#[test]
fn test_decode_without_delimiter_is_malformed() {
    match decode("no-delimiter-here") {
        Err(QueueError::MalformedMessage { wire, .. }) => {
            assert_eq!(wire, "no-delimiter-here");
        }
        other => panic!("Expected MalformedMessage, got: {:?}", other),
    }
}

#[test]
fn test_decode_with_empty_id_is_malformed() {
    assert!(matches!(
        decode(":payload"),
        Err(QueueError::MalformedMessage { .. })
    ));
}

// ============================================================================
// Timestamp / ReceivedMessage Tests
// ============================================================================

#[test]
fn test_timestamp_millis_round_trip() {
    let ts = Timestamp::from_unix_millis(1_700_000_000_123).unwrap();
    assert_eq!(ts.unix_millis(), 1_700_000_000_123);
    assert_eq!(ts.to_string(), "2023-11-14 22:13:20.123 UTC");
}

#[test]
fn test_received_message_mode() {
    let id: MessageId = "1700000000-0".parse().unwrap();
    let prioritized = ReceivedMessage {
        message_id: id.clone(),
        payload: "p".to_string(),
        score: Score::Priority(Priority::new(3).unwrap()),
        claimed_at: Timestamp::now(),
    };
    assert!(!prioritized.was_delayed());

    let delayed = ReceivedMessage {
        score: Score::EligibleAt(Timestamp::now()),
        ..prioritized
    };
    assert!(delayed.was_delayed());
}
