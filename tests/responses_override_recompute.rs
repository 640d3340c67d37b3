mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn manual_marks_rebuild_the_assignment_grade() {
    let workspace = temp_dir("lmsd-override-recompute");
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
        json!({ "name": "Chemistry" }),
    );
    let class_id = class.get("classId").and_then(|v| v.as_i64()).expect("classId");
    let assignment = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.create",
        json!({
            "classId": class_id,
            "title": "Bonding Quiz",
            "questions": ["Define covalent bonds.", "Define ionic bonds."]
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

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.submit",
        json!({
            "assignmentId": assignment_id,
            "studentId": 7,
            "responses": [
                { "questionId": question_ids[0], "answer": "Shared electrons." },
                { "questionId": question_ids[1], "answer": "Transferred electrons." }
            ]
        }),
    );
    assert_eq!(
        submitted.get("status").and_then(|v| v.as_str()),
        Some("pending")
    );
    let response_ids: Vec<i64> = submitted
        .get("responseIds")
        .and_then(|v| v.as_array())
        .expect("responseIds")
        .iter()
        .map(|v| v.as_i64().expect("response id"))
        .collect();

    // Out-of-range marks are rejected before anything is written.
    let rejected = request(
        &mut stdin,
        &mut reader,
        "5",
        "responses.updateMarks",
        json!({ "responseId": response_ids[0], "marks": 11.0 }),
    );
    assert_eq!(rejected.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        rejected
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "responses.updateMarks",
        json!({ "responseId": response_ids[0], "marks": 7.0 }),
    );
    assert_eq!(
        first.get("assignmentMarks").and_then(|v| v.as_f64()),
        Some(7.0),
        "ungraded second response must not count as zero yet"
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "responses.updateMarks",
        json!({ "responseId": response_ids[1], "marks": 9.0 }),
    );
    assert_eq!(
        second.get("assignmentMarks").and_then(|v| v.as_f64()),
        Some(16.0)
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "submissions.list",
        json!({ "assignmentId": assignment_id }),
    );
    let entry = listed
        .get("submissions")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .expect("submission entry");
    assert_eq!(entry.get("status").and_then(|v| v.as_str()), Some("graded"));
    assert_eq!(entry.get("marks").and_then(|v| v.as_f64()), Some(16.0));
    assert_eq!(entry.get("percentage").and_then(|v| v.as_f64()), Some(80.0));

    let comment = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "responses.comment",
        json!({
            "responseId": response_ids[0],
            "userId": "student-7",
            "content": "Why only 7? I named both properties."
        }),
    );
    assert!(comment.get("commentId").and_then(|v| v.as_i64()).is_some());
    assert!(comment.get("createdAt").and_then(|v| v.as_str()).is_some());

    let review = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "submissions.review",
        json!({ "assignmentId": assignment_id, "studentId": 7 }),
    );
    assert_eq!(review.get("percentage").and_then(|v| v.as_f64()), Some(80.0));
    let questions = review
        .get("questions")
        .and_then(|v| v.as_array())
        .expect("questions");
    assert_eq!(
        questions[0].get("grader").and_then(|v| v.as_str()),
        Some("manual")
    );
    assert_eq!(questions[0].get("marks").and_then(|v| v.as_f64()), Some(7.0));
    let comments = questions[0]
        .get("comments")
        .and_then(|v| v.as_array())
        .expect("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(
        comments[0].get("userId").and_then(|v| v.as_str()),
        Some("student-7")
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "stats.class",
        json!({ "classId": class_id, "scope": "student", "studentId": 7 }),
    );
    assert_eq!(
        stats.get("overallAverage").and_then(|v| v.as_f64()),
        Some(80.0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}
