//! Signaling scenarios driven through connection actors.
//!
//! Each test spawns real `ConnectionActor`s against a real registry, with a
//! scripted media backend standing in for the media server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bc_service::actors::Phase;
use bc_service::errors::{
    MSG_ALREADY_OCCUPIED, MSG_ALREADY_VIEWING, MSG_NO_TEACHER, MSG_ROLE_HELD, MSG_UNKNOWN_ERROR,
};
use bc_service::protocol::{ClientMessage, ServerMessage};
use bc_test_utils::mock_media::mock_answer;
use bc_test_utils::*;
use common::types::{Role, SlotId};
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(100);

async fn join_teacher(harness: &TestHarness) -> TestPeer {
    let mut teacher = harness.connect();
    teacher.send(add_teacher()).await;
    assert!(is_accepted(&teacher.recv().await));
    teacher
}

async fn join_student(harness: &TestHarness, expected_slot: u32) -> TestPeer {
    let mut student = harness.connect();
    student.send(add_student()).await;
    match student.recv().await {
        ServerMessage::AddStudentResponse {
            slot_id: Some(slot),
            sdp_answer: Some(_),
            ..
        } => assert_eq!(slot, SlotId(expected_slot)),
        other => panic!("expected accepted addStudentResponse, got {other:?}"),
    }
    student
}

// ============================================================================
// Role claims
// ============================================================================

#[tokio::test]
async fn test_teacher_claim_returns_backend_answer() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;

    match teacher.recv().await {
        ServerMessage::AddTeacherResponse {
            sdp_answer: Some(answer),
            message: None,
            ..
        } => assert_eq!(answer, mock_answer(teacher.id())),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        harness.registry.current_teacher().await.unwrap(),
        Some(teacher.id())
    );

    let state = teacher.state().await;
    assert_eq!(state.phase, Phase::Active);
    assert_eq!(state.role, Role::Teacher);
    assert_eq!(harness.media().presenters(), 1);
    assert_eq!(harness.media().gathers(), 1);
}

#[tokio::test]
async fn test_second_teacher_rejected_while_first_present() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let teacher = join_teacher(&harness).await;

    let mut rival = harness.connect();
    rival.send(add_teacher()).await;

    let response = rival.recv().await;
    assert_eq!(rejection_message(&response), Some(MSG_ALREADY_OCCUPIED));
    assert_eq!(
        harness.registry.current_teacher().await.unwrap(),
        Some(teacher.id())
    );
    assert_eq!(rival.state().await.phase, Phase::Idle);
    // The rejected claim never reached the media side.
    assert_eq!(harness.media().presenters(), 1);
}

#[tokio::test]
async fn test_student_rejected_without_teacher() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut student = harness.connect();

    student.send(add_student()).await;

    let response = student.recv().await;
    assert!(matches!(
        response,
        ServerMessage::AddStudentResponse { slot_id: None, .. }
    ));
    assert_eq!(rejection_message(&response), Some(MSG_NO_TEACHER));
    assert!(harness.registry.snapshot().await.unwrap().is_empty());
    assert_eq!(harness.media().viewers(), 0);
}

#[tokio::test]
async fn test_concurrent_teacher_claims_have_one_winner() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut peers: Vec<TestPeer> = (0..8).map(|_| harness.connect()).collect();

    for peer in &peers {
        peer.send(add_teacher()).await;
    }

    let mut winners = Vec::new();
    for peer in &mut peers {
        let response = peer.recv().await;
        if is_accepted(&response) {
            winners.push(peer.id());
        } else {
            assert_eq!(rejection_message(&response), Some(MSG_ALREADY_OCCUPIED));
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(
        harness.registry.current_teacher().await.unwrap(),
        winners.first().copied()
    );
}

#[tokio::test]
async fn test_duplicate_claims_on_one_connection_rejected() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;
    let mut student = join_student(&harness, 0).await;

    student.send(add_student()).await;
    assert_eq!(
        rejection_message(&student.recv().await),
        Some(MSG_ALREADY_VIEWING)
    );

    student.send(add_teacher()).await;
    assert_eq!(rejection_message(&student.recv().await), Some(MSG_ROLE_HELD));

    teacher.send(add_student()).await;
    // Roster notice for the student arrives first.
    assert_eq!(
        teacher.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );
    assert_eq!(rejection_message(&teacher.recv().await), Some(MSG_ROLE_HELD));

    // Rejections leave the held roles untouched.
    let snapshot = harness.registry.snapshot().await.unwrap();
    assert_eq!(snapshot.teacher, Some(teacher.id()));
    assert_eq!(snapshot.student_count(), 1);
    assert_eq!(student.state().await.slot_id, Some(SlotId(0)));
}

// ============================================================================
// Broadcast lifecycle
// ============================================================================

#[tokio::test]
async fn test_teacher_sees_roster_and_slots_are_reused() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;

    let mut b = join_student(&harness, 0).await;
    let _c = join_student(&harness, 1).await;

    assert_eq!(
        teacher.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );
    assert_eq!(
        teacher.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(1) }
    );

    b.send(ClientMessage::Stop).await;
    assert_eq!(
        teacher.recv().await,
        ServerMessage::RemoveStudentToTeacher { slot_id: SlotId(0) }
    );
    assert_eq!(b.state().await.phase, Phase::Closed);

    // The lowest free slot is handed out again.
    let _d = join_student(&harness, 0).await;
    assert_eq!(
        teacher.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );

    let students = harness.registry.current_students().await.unwrap();
    let slots: Vec<u32> = students.iter().map(|s| s.slot_id.0).collect();
    assert_eq!(slots, vec![0, 1]);
}

#[tokio::test]
async fn test_teacher_leaving_stops_every_student_once() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;
    let mut students = vec![
        join_student(&harness, 0).await,
        join_student(&harness, 1).await,
        join_student(&harness, 2).await,
    ];

    teacher.close().await;

    for student in &mut students {
        assert_eq!(student.recv().await, ServerMessage::StopCommunication);
    }
    for student in &mut students {
        student.expect_silence(QUIET).await;
        let state = student.state().await;
        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.role, Role::Unassigned);
        assert_eq!(state.slot_id, None);
    }

    assert!(harness.registry.snapshot().await.unwrap().is_empty());
    // One presenter plus three viewers, each disposed once.
    assert_eq!(harness.media().disposed(), 4);
}

#[tokio::test]
async fn test_student_can_rejoin_under_new_teacher() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut first = join_teacher(&harness).await;
    let mut student = join_student(&harness, 0).await;
    assert_eq!(
        first.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );

    first.send(ClientMessage::Stop).await;
    assert_eq!(student.recv().await, ServerMessage::StopCommunication);

    // The old teacher's connection may claim again.
    first.send(add_teacher()).await;
    assert!(is_accepted(&first.recv().await));

    student.send(add_student()).await;
    let response = student.recv().await;
    assert!(is_accepted(&response));
    assert_eq!(
        first.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );
}

#[tokio::test]
async fn test_student_can_become_teacher_after_stop() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;
    let mut student = join_student(&harness, 0).await;

    teacher.close().await;
    assert_eq!(student.recv().await, ServerMessage::StopCommunication);

    student.send(add_teacher()).await;
    assert!(is_accepted(&student.recv().await));
    assert_eq!(
        harness.registry.current_teacher().await.unwrap(),
        Some(student.id())
    );
}

// ============================================================================
// Stop and close
// ============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;

    teacher.send(ClientMessage::Stop).await;
    teacher.send(ClientMessage::Stop).await;
    teacher.expect_silence(QUIET).await;

    assert_eq!(teacher.state().await.phase, Phase::Closed);
    assert_eq!(harness.registry.current_teacher().await.unwrap(), None);
    assert_eq!(harness.media().disposed(), 1);

    // Closing afterwards has nothing left to release.
    teacher.close().await;
    assert_eq!(harness.media().disposed(), 1);
}

#[tokio::test]
async fn test_stop_before_any_claim_is_ignored() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut peer = harness.connect();

    peer.send(ClientMessage::Stop).await;
    peer.send(on_ice_candidate(1)).await;
    peer.expect_silence(QUIET).await;

    assert_eq!(peer.state().await.phase, Phase::Idle);
    assert!(harness.media().remote_candidates_for(peer.id()).is_empty());
}

#[tokio::test]
async fn test_student_close_notifies_teacher() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;
    let mut student = join_student(&harness, 0).await;
    assert_eq!(
        teacher.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );

    student.close().await;

    assert_eq!(
        teacher.recv().await,
        ServerMessage::RemoveStudentToTeacher { slot_id: SlotId(0) }
    );
    assert_eq!(
        harness.registry.current_students().await.unwrap().len(),
        0
    );
    assert_eq!(teacher.state().await.phase, Phase::Active);
}

#[tokio::test]
async fn test_shutdown_tears_down_every_connection() {
    let harness = TestHarness::new(MockMediaBackend::new());
    let mut teacher = join_teacher(&harness).await;
    let mut student = join_student(&harness, 0).await;

    harness.shutdown();
    teacher.close().await;
    student.close().await;

    assert!(harness.registry.snapshot().await.unwrap().is_empty());
    assert_eq!(harness.media().disposed(), 2);
    assert_eq!(harness.ctx.metrics.connection_count(), 0);
}

// ============================================================================
// Negotiation
// ============================================================================

#[tokio::test]
async fn test_viewer_negotiation_failure_rolls_back() {
    let backend = MockMediaBackend::builder().fail_viewer_answers().build();
    let harness = TestHarness::new(backend);
    let mut teacher = join_teacher(&harness).await;
    let mut student = harness.connect();

    student.send(add_student()).await;

    let response = student.recv().await;
    assert_eq!(rejection_message(&response), Some(MSG_UNKNOWN_ERROR));
    assert_eq!(student.state().await.phase, Phase::Closed);
    assert!(harness
        .registry
        .current_students()
        .await
        .unwrap()
        .is_empty());

    // The teacher never heard of the failed viewer.
    teacher.expect_silence(QUIET).await;
    assert_eq!(harness.media().disposed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_negotiation_timeout_rejects_and_releases_role() {
    let backend = MockMediaBackend::builder().hang_answers().build();
    let harness = TestHarness::with_timeout(backend, Duration::from_millis(50));
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;

    let response = teacher.recv().await;
    assert_eq!(rejection_message(&response), Some(MSG_UNKNOWN_ERROR));
    assert_eq!(harness.registry.current_teacher().await.unwrap(), None);
    assert_eq!(harness.media().answers(), 0);
    assert_eq!(harness.media().disposed(), 1);
}

#[tokio::test]
async fn test_candidates_during_negotiation_are_flushed_in_order() {
    let backend = MockMediaBackend::builder()
        .answer_delay(Duration::from_millis(200))
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;
    teacher.send(on_ice_candidate(1)).await;
    teacher.send(on_ice_candidate(2)).await;

    // State requests are answered while the answer is pending.
    assert_eq!(teacher.state().await.phase, Phase::OfferSent);
    teacher.send(on_ice_candidate(3)).await;
    assert!(harness
        .media()
        .remote_candidates_for(teacher.id())
        .is_empty());

    assert!(is_accepted(&teacher.recv().await));
    assert_eq!(teacher.state().await.phase, Phase::Active);
    assert_eq!(
        harness.media().remote_candidates_for(teacher.id()),
        vec![host_candidate(1), host_candidate(2), host_candidate(3)]
    );

    // Once active, candidates go straight through.
    teacher.send(on_ice_candidate(4)).await;
    let _ = teacher.state().await;
    assert_eq!(
        harness
            .media()
            .remote_candidates_for(teacher.id())
            .last()
            .cloned(),
        Some(host_candidate(4))
    );
}

#[tokio::test]
async fn test_claims_during_negotiation_are_replayed_after() {
    let backend = MockMediaBackend::builder()
        .answer_delay(Duration::from_millis(100))
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;
    teacher.send(add_teacher()).await;

    assert!(is_accepted(&teacher.recv().await));
    assert_eq!(rejection_message(&teacher.recv().await), Some(MSG_ROLE_HELD));
}

#[tokio::test]
async fn test_stop_during_negotiation_cancels_claim() {
    let backend = MockMediaBackend::builder()
        .answer_delay(Duration::from_secs(30))
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;
    teacher.send(ClientMessage::Stop).await;

    // No response for an abandoned claim.
    teacher.expect_silence(QUIET).await;
    assert_eq!(teacher.state().await.phase, Phase::Closed);
    assert_eq!(harness.registry.current_teacher().await.unwrap(), None);
    assert_eq!(harness.media().disposed(), 1);
    assert_eq!(harness.media().answers(), 0);
}

#[tokio::test]
async fn test_local_candidates_forwarded_after_answer() {
    let backend = MockMediaBackend::builder()
        .local_candidates(vec![host_candidate(7), host_candidate(8)])
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;

    assert!(is_accepted(&teacher.recv().await));
    assert_eq!(
        teacher.recv().await,
        ServerMessage::IceCandidate {
            candidate: host_candidate(7)
        }
    );
    assert_eq!(
        teacher.recv().await,
        ServerMessage::IceCandidate {
            candidate: host_candidate(8)
        }
    );
}

#[tokio::test]
async fn test_rejected_remote_candidate_keeps_session() {
    let backend = MockMediaBackend::builder()
        .reject_remote_candidates()
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = join_teacher(&harness).await;

    teacher.send(on_ice_candidate(1)).await;
    teacher.expect_silence(QUIET).await;

    assert_eq!(teacher.state().await.phase, Phase::Active);
    assert_eq!(
        harness.registry.current_teacher().await.unwrap(),
        Some(teacher.id())
    );
}

// ============================================================================
// Teacher leaving around a student's negotiation
// ============================================================================

#[tokio::test]
async fn test_teacher_leaving_while_student_negotiates() {
    let backend = MockMediaBackend::builder()
        .answer_delay(Duration::from_millis(400))
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = join_teacher(&harness).await;
    let mut student = harness.connect();

    student.send(add_student()).await;
    assert_eq!(student.state().await.phase, Phase::OfferSent);
    teacher.send(ClientMessage::Stop).await;

    assert_eq!(student.recv().await, ServerMessage::StopCommunication);
    // Outlasts the pending answer: no addStudentResponse follows.
    student.expect_silence(Duration::from_millis(600)).await;
    teacher.expect_silence(QUIET).await;

    assert_eq!(student.state().await.phase, Phase::Closed);
    assert!(harness.registry.snapshot().await.unwrap().is_empty());
    // Teacher and student endpoints, each released once.
    assert_eq!(harness.media().disposed(), 2);
}

#[tokio::test]
async fn test_stale_teacher_left_spares_student_under_new_teacher() {
    let backend = MockMediaBackend::builder()
        .candidate_delay(Duration::from_millis(500))
        .build();
    let harness = TestHarness::new(backend);
    let mut first = join_teacher(&harness).await;
    let mut student = join_student(&harness, 0).await;

    // The student is busy on a slow candidate while it stops and rejoins.
    student.send(on_ice_candidate(1)).await;
    student.send(ClientMessage::Stop).await;
    student.send(add_student()).await;

    // The first teacher leaves while the student is still registered
    // under it; its notice queues behind the rejoin.
    first.send(ClientMessage::Stop).await;
    let _ = first.state().await;
    let mut second = join_teacher(&harness).await;

    match student.recv().await {
        ServerMessage::AddStudentResponse {
            slot_id: Some(slot),
            sdp_answer: Some(_),
            ..
        } => assert_eq!(slot, SlotId(0)),
        other => panic!("expected accepted addStudentResponse, got {other:?}"),
    }
    assert_eq!(
        second.recv().await,
        ServerMessage::AddStudentToTeacher { slot_id: SlotId(0) }
    );

    // The leftover notice from the first teacher changes nothing.
    student.expect_silence(QUIET).await;
    assert_eq!(student.state().await.phase, Phase::Active);
    let snapshot = harness.registry.snapshot().await.unwrap();
    assert_eq!(snapshot.teacher, Some(second.id()));
    assert_eq!(snapshot.student_count(), 1);
    assert_eq!(
        snapshot.students.first().map(|s| (s.connection_id, s.slot_id)),
        Some((student.id(), SlotId(0)))
    );

    // The new teacher leaving still stops the student exactly once.
    second.send(ClientMessage::Stop).await;
    assert_eq!(student.recv().await, ServerMessage::StopCommunication);
    student.expect_silence(QUIET).await;
    assert!(harness.registry.snapshot().await.unwrap().is_empty());
}

// ============================================================================
// Negotiation buffer limits
// ============================================================================

#[tokio::test]
async fn test_candidates_past_limit_dropped_during_negotiation() {
    let backend = MockMediaBackend::builder()
        .answer_delay(Duration::from_millis(500))
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;
    for n in 1..=200 {
        teacher.send(on_ice_candidate(n)).await;
    }

    assert!(is_accepted(&teacher.recv().await));
    let _ = teacher.state().await;
    let applied = harness.media().remote_candidates_for(teacher.id());
    let expected: Vec<_> = (1..=128).map(host_candidate).collect();
    assert_eq!(applied, expected);
}

#[tokio::test]
async fn test_claims_past_limit_dropped_during_negotiation() {
    let backend = MockMediaBackend::builder()
        .answer_delay(Duration::from_millis(500))
        .build();
    let harness = TestHarness::new(backend);
    let mut teacher = harness.connect();

    teacher.send(add_teacher()).await;
    for _ in 0..40 {
        teacher.send(add_teacher()).await;
    }

    assert!(is_accepted(&teacher.recv().await));
    for _ in 0..32 {
        assert_eq!(rejection_message(&teacher.recv().await), Some(MSG_ROLE_HELD));
    }
    teacher.expect_silence(QUIET).await;
    assert_eq!(teacher.state().await.phase, Phase::Active);
}
