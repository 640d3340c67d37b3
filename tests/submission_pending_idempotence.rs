mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn unanswered_grading_leaves_submission_pending_and_resubmit_reuses_rows() {
    let workspace = temp_dir("lmsd-pending-submit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "History" }),
    );
    let class_id = class.get("classId").and_then(|v| v.as_i64()).expect("classId");
    let assignment = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.create",
        json!({
            "classId": class_id,
            "title": "Essay Quiz",
            "questions": ["Describe the causes.", "Describe the outcome."]
        }),
    );
    let assignment_id = assignment
        .get("assignmentId")
        .and_then(|v| v.as_i64())
        .expect("assignmentId");
    let question_ids: Vec<i64> = assignment
        .get("questionIds")
        .and_then(|v| v.as_array())
        .expect("questionIds")
        .iter()
        .map(|v| v.as_i64().expect("question id"))
        .collect();
    assert_eq!(question_ids.len(), 2);

    // No grading agent configured, so submission stays pending.
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.submit",
        json!({
            "assignmentId": assignment_id,
            "studentId": 9,
            "responses": [
                { "questionId": question_ids[0], "answer": "Draft one." },
                { "questionId": question_ids[1], "answer": "Draft two." }
            ]
        }),
    );
    assert_eq!(first.get("status").and_then(|v| v.as_str()), Some("pending"));
    assert!(first.get("marks").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(first.get("possible").and_then(|v| v.as_f64()), Some(20.0));
    let first_ids: Vec<i64> = first
        .get("responseIds")
        .and_then(|v| v.as_array())
        .expect("responseIds")
        .iter()
        .map(|v| v.as_i64().expect("response id"))
        .collect();
    assert_eq!(first_ids.len(), 2);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "submissions.list",
        json!({ "assignmentId": assignment_id }),
    );
    let entry = listed
        .get("submissions")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .expect("submission entry");
    assert_eq!(entry.get("studentId").and_then(|v| v.as_i64()), Some(9));
    assert_eq!(entry.get("responseCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(entry.get("status").and_then(|v| v.as_str()), Some("pending"));
    assert!(entry.get("marks").map(|v| v.is_null()).unwrap_or(false));

    // Same student, new wording: rows are overwritten, not duplicated.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "submissions.submit",
        json!({
            "assignmentId": assignment_id,
            "studentId": 9,
            "responses": [
                { "questionId": question_ids[0], "answer": "Final causes answer." },
                { "questionId": question_ids[1], "answer": "Final outcome answer." }
            ]
        }),
    );
    let second_ids: Vec<i64> = second
        .get("responseIds")
        .and_then(|v| v.as_array())
        .expect("responseIds")
        .iter()
        .map(|v| v.as_i64().expect("response id"))
        .collect();
    assert_eq!(first_ids, second_ids, "resubmission must reuse response rows");

    // Review is only available once a grade exists.
    let early = request(
        &mut stdin,
        &mut reader,
        "7",
        "submissions.review",
        json!({ "assignmentId": assignment_id, "studentId": 9 }),
    );
    assert_eq!(early.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        early
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );

    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grades.set",
        json!({
            "assignmentId": assignment_id,
            "studentId": 9,
            "marks": 15.0,
            "feedback": "Solid"
        }),
    );
    assert_eq!(graded.get("percentage").and_then(|v| v.as_f64()), Some(75.0));

    let review = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "submissions.review",
        json!({ "assignmentId": assignment_id, "studentId": 9 }),
    );
    assert_eq!(review.get("marks").and_then(|v| v.as_f64()), Some(15.0));
    assert_eq!(review.get("possible").and_then(|v| v.as_f64()), Some(20.0));
    assert_eq!(review.get("percentage").and_then(|v| v.as_f64()), Some(75.0));
    assert_eq!(review.get("feedback").and_then(|v| v.as_str()), Some("Solid"));
    let questions = review
        .get("questions")
        .and_then(|v| v.as_array())
        .expect("questions");
    assert_eq!(questions.len(), 2);
    assert_eq!(
        questions[0].get("answer").and_then(|v| v.as_str()),
        Some("Final causes answer."),
        "review must show the latest submitted content"
    );
    assert_eq!(
        questions[0].get("graded").and_then(|v| v.as_bool()),
        Some(false),
        "manual assignment grade does not mark responses graded"
    );
    assert_eq!(
        questions[0].get("responseId").and_then(|v| v.as_i64()),
        Some(first_ids[0])
    );

    let relisted = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "submissions.list",
        json!({ "assignmentId": assignment_id }),
    );
    let entry = relisted
        .get("submissions")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .expect("submission entry");
    assert_eq!(entry.get("status").and_then(|v| v.as_str()), Some("pending"));
    assert_eq!(entry.get("marks").and_then(|v| v.as_f64()), Some(15.0));
    assert_eq!(entry.get("percentage").and_then(|v| v.as_f64()), Some(75.0));

    let _ = std::fs::remove_dir_all(workspace);
}
