//! Broadcast fan-out.
//!
//! Stateless: each function takes what the registry returned and posts
//! notices to the affected connection actors. The actors turn notices into
//! client messages, so every client message is still written by the
//! connection that owns the socket.
//!
//! The media side is a single shared publisher feed, so a viewer joining or
//! leaving never renegotiates the teacher. The teacher only gets roster
//! notices.

use super::connection::ConnectionActorHandle;
use super::messages::{ConnectionMessage, RegisteredStudent};

use common::types::SlotId;
use tracing::{debug, info};

/// A student finished negotiating in `slot_id`.
pub fn on_student_joined(teacher: &ConnectionActorHandle, slot_id: SlotId) {
    if !teacher.notify(ConnectionMessage::StudentJoined { slot_id }) {
        debug!(
            target: "bc.actor.fanout",
            teacher = %teacher.connection_id(),
            slot_id = %slot_id,
            "Student-joined notice not delivered"
        );
    }
}

/// A student released `slot_id`.
pub fn on_student_left(teacher: Option<&ConnectionActorHandle>, slot_id: SlotId) {
    let Some(teacher) = teacher else {
        return;
    };
    if !teacher.notify(ConnectionMessage::StudentLeft { slot_id }) {
        debug!(
            target: "bc.actor.fanout",
            teacher = %teacher.connection_id(),
            slot_id = %slot_id,
            "Student-left notice not delivered"
        );
    }
}

/// The teacher left; `students` were drained from the registry.
///
/// Each drained student is told exactly once. Returns how many were told.
pub fn on_teacher_left(students: Vec<RegisteredStudent>) -> usize {
    let count = students.len();
    for student in &students {
        student.handle.notify_teacher_left(student.tenure);
    }

    if count > 0 {
        info!(
            target: "bc.actor.fanout",
            students = count,
            "Teacher left, students notified"
        );
    }
    count
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::messages::TeacherTenure;
    use common::types::ConnectionId;

    fn tenure() -> TeacherTenure {
        TeacherTenure {
            teacher: ConnectionId::new(),
            term: 0,
        }
    }

    #[tokio::test]
    async fn test_student_joined_reaches_teacher() {
        let (teacher, mut rx) = ConnectionActorHandle::detached();

        on_student_joined(&teacher, SlotId(3));

        assert!(matches!(
            rx.recv().await.unwrap(),
            ConnectionMessage::StudentJoined { slot_id: SlotId(3) }
        ));
    }

    #[tokio::test]
    async fn test_student_left_without_teacher_is_noop() {
        on_student_left(None, SlotId(0));

        let (teacher, mut rx) = ConnectionActorHandle::detached();
        on_student_left(Some(&teacher), SlotId(1));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ConnectionMessage::StudentLeft { slot_id: SlotId(1) }
        ));
    }

    #[tokio::test]
    async fn test_teacher_left_notifies_each_student_once() {
        let (a, mut rx_a) = ConnectionActorHandle::detached();
        let (b, mut rx_b) = ConnectionActorHandle::detached();

        let tenure = tenure();

        let notified = on_teacher_left(vec![
            RegisteredStudent {
                slot_id: SlotId(0),
                handle: a,
                tenure,
            },
            RegisteredStudent {
                slot_id: SlotId(1),
                handle: b,
                tenure,
            },
        ]);
        assert_eq!(notified, 2);

        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ConnectionMessage::TeacherLeft { tenure: t } if t == tenure
        ));
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ConnectionMessage::TeacherLeft { tenure: t } if t == tenure
        ));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_teacher_left_survives_full_mailbox() {
        let (student, mut rx) = ConnectionActorHandle::detached();
        // Fill the mailbox with roster notices
        while student.notify(ConnectionMessage::StudentLeft { slot_id: SlotId(0) }) {}

        on_teacher_left(vec![RegisteredStudent {
            slot_id: SlotId(0),
            handle: student,
            tenure: tenure(),
        }]);

        let mut saw_teacher_left = false;
        while let Some(message) = rx.recv().await {
            if matches!(message, ConnectionMessage::TeacherLeft { .. }) {
                saw_teacher_left = true;
                break;
            }
        }
        assert!(saw_teacher_left);
    }
}
