use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("lms.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates tables and indexes, and applies column migrations for existing
/// workspaces. Split out of `open_db` so tests can run on in-memory
/// connections.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            course_name TEXT
        )",
        [],
    )?;
    ensure_classes_course_name(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS resources(
            id INTEGER PRIMARY KEY,
            class_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            type TEXT NOT NULL,
            url TEXT,
            content TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_resources_class ON resources(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            outline TEXT
        )",
        [],
    )?;

    // An occurrence ties a topic to the resource it was extracted from.
    // resource_id is NULL for teacher-authored topics with no resource.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS occurrences(
            id INTEGER PRIMARY KEY,
            topic_id INTEGER NOT NULL,
            resource_id INTEGER,
            FOREIGN KEY(topic_id) REFERENCES topics(id),
            FOREIGN KEY(resource_id) REFERENCES resources(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occurrences_topic ON occurrences(topic_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occurrences_resource ON occurrences(resource_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS key_concepts(
            id INTEGER PRIMARY KEY,
            occurrence_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            timestamp_start INTEGER,
            timestamp_end INTEGER,
            page_number INTEGER,
            section TEXT,
            FOREIGN KEY(occurrence_id) REFERENCES occurrences(id)
        )",
        [],
    )?;
    ensure_key_concepts_page_anchor(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_key_concepts_occurrence ON key_concepts(occurrence_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id INTEGER PRIMARY KEY,
            class_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id INTEGER PRIMARY KEY,
            assignment_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_assignment ON questions(assignment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS question_responses(
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            graded INTEGER NOT NULL DEFAULT 0,
            grader TEXT NOT NULL DEFAULT 'ai',
            marks REAL,
            feedback TEXT,
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(question_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_question_responses_question ON question_responses(question_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_question_responses_student ON question_responses(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submission_batches(
            id INTEGER PRIMARY KEY,
            assignment_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submission_batches_assignment ON submission_batches(assignment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topic_scores(
            id INTEGER PRIMARY KEY,
            topic_id INTEGER NOT NULL,
            batch_id INTEGER NOT NULL,
            marks REAL NOT NULL,
            FOREIGN KEY(topic_id) REFERENCES topics(id),
            FOREIGN KEY(batch_id) REFERENCES submission_batches(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topic_scores_topic ON topic_scores(topic_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topic_scores_batch ON topic_scores(batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_grades(
            id INTEGER PRIMARY KEY,
            assignment_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            marks REAL NOT NULL,
            feedback TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignment_grades_assignment ON assignment_grades(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignment_grades_student ON assignment_grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_review_comments(
            id INTEGER PRIMARY KEY,
            response_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(response_id) REFERENCES question_responses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_review_comments_response ON grade_review_comments(response_id)",
        [],
    )?;

    Ok(())
}

fn ensure_classes_course_name(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "course_name")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE classes ADD COLUMN course_name TEXT", [])?;
    Ok(())
}

// Early workspaces only anchored concepts by timestamp; document resources
// need page/section anchors too.
fn ensure_key_concepts_page_anchor(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "key_concepts", "page_number")? {
        conn.execute("ALTER TABLE key_concepts ADD COLUMN page_number INTEGER", [])?;
    }
    if !table_has_column(conn, "key_concepts", "section")? {
        conn.execute("ALTER TABLE key_concepts ADD COLUMN section TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
