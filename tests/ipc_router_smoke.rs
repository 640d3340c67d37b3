use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lmsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lmsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("lmsd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "2a",
        "agents.configure",
        json!({ "timeoutSecs": 30 }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "Smoke Class", "courseName": "SMK-100" }),
    );
    let class_id = created
        .get("result")
        .and_then(|v| v.get("classId"))
        .and_then(|v| v.as_i64())
        .expect("classId");

    let _ = request(&mut stdin, &mut reader, "4", "classes.list", json!({}));

    let resource = request(
        &mut stdin,
        &mut reader,
        "5",
        "resources.create",
        json!({ "classId": class_id, "title": "Lecture 1", "type": "video" }),
    );
    let resource_id = resource
        .get("result")
        .and_then(|v| v.get("resourceId"))
        .and_then(|v| v.as_i64())
        .expect("resourceId");
    assert_eq!(
        resource
            .get("result")
            .and_then(|v| v.get("analysis"))
            .and_then(|v| v.as_str()),
        Some("skipped"),
        "no url and no agent, analysis should be skipped"
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "resources.list",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "resources.analysis",
        json!({ "resourceId": resource_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "analysis.ingest",
        json!({
            "resourceId": resource_id,
            "body": { "result": { "parts": [ { "kind": "text", "text": "no structured payload here" } ] } }
        }),
    );

    let topic = request(
        &mut stdin,
        &mut reader,
        "9",
        "topics.create",
        json!({ "name": "Smoke Topic" }),
    );
    let topic_id = topic
        .get("result")
        .and_then(|v| v.get("topicId"))
        .and_then(|v| v.as_i64())
        .expect("topicId");
    let _ = request(&mut stdin, &mut reader, "10", "topics.list", json!({}));

    let assignment = request(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.create",
        json!({ "classId": class_id, "title": "Smoke Quiz", "questions": ["What is smoke?"] }),
    );
    let assignment_id = assignment
        .get("result")
        .and_then(|v| v.get("assignmentId"))
        .and_then(|v| v.as_i64())
        .expect("assignmentId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "assignments.list",
        json!({ "classId": class_id }),
    );
    let fetched = request(
        &mut stdin,
        &mut reader,
        "13",
        "assignments.get",
        json!({ "assignmentId": assignment_id }),
    );
    let question_id = fetched
        .get("result")
        .and_then(|v| v.get("questions"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|q| q.get("questionId"))
        .and_then(|v| v.as_i64())
        .expect("questionId");

    let submitted = request(
        &mut stdin,
        &mut reader,
        "14",
        "submissions.submit",
        json!({
            "assignmentId": assignment_id,
            "studentId": 9,
            "responses": [ { "questionId": question_id, "answer": "It rises." } ]
        }),
    );
    let response_id = submitted
        .get("result")
        .and_then(|v| v.get("responseIds"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_i64())
        .expect("responseId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "submissions.list",
        json!({ "assignmentId": assignment_id }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "responses.updateMarks",
        json!({ "responseId": response_id, "marks": 6.0 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "responses.comment",
        json!({ "responseId": response_id, "userId": "teacher-1", "content": "smoke note" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "grades.set",
        json!({ "assignmentId": assignment_id, "studentId": 9, "marks": 6.0 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "submissions.review",
        json!({ "assignmentId": assignment_id, "studentId": 9 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "stats.class",
        json!({ "classId": class_id }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "resources.delete",
        json!({ "resourceId": resource_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "topics.delete",
        json!({ "topicId": topic_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "classes.delete",
        json!({ "classId": class_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
