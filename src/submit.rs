use rusqlite::{Connection, OptionalExtension};

use crate::agent::{ConceptContext, GradingAgent, GradingRequest, QuestionAnswer, TopicContext};
use crate::error::CoreError;
use crate::stats::round1;

#[derive(Debug, Clone)]
pub struct AnswerInput {
    pub question_id: i64,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Graded,
    Pending,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub status: SubmissionStatus,
    pub marks: Option<f64>,
    pub possible: f64,
    pub percentage: Option<f64>,
    pub feedback: Option<String>,
    /// Durable response ids in answer order. Stable across resubmission.
    pub response_ids: Vec<i64>,
}

struct QuestionRow {
    id: i64,
    content: String,
}

/// Accepts a student's answers for an assignment, invokes the grading
/// collaborator, and applies whatever it returns.
///
/// The answer upsert is its own transaction and is durable regardless of
/// how grading goes: a resubmission overwrites content and clears the
/// graded flag, keeping one response per (student, question). A request
/// naming the same question twice is rejected before any write. Grading
/// that yields nothing (unconfigured agent, transport failure,
/// conversational reply) leaves the submission pending. A structured
/// result is applied in a second transaction: the assignment grade and
/// per-question marks are upserted, and the batch's topic scores are
/// replaced wholesale.
pub fn process_submission(
    conn: &Connection,
    assignment_id: i64,
    student_id: i64,
    answers: &[AnswerInput],
    grader: &dyn GradingAgent,
) -> Result<SubmissionOutcome, CoreError> {
    let class_id: i64 = conn
        .query_row(
            "SELECT class_id FROM assignments WHERE id = ?",
            [assignment_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found("assignment", assignment_id))?;

    let questions = load_questions(conn, assignment_id)?;
    let mut seen = Vec::with_capacity(answers.len());
    for a in answers {
        if !questions.iter().any(|q| q.id == a.question_id) {
            return Err(CoreError::not_found("question", a.question_id));
        }
        if seen.contains(&a.question_id) {
            return Err(CoreError::Conflict(format!(
                "two answers for question {}",
                a.question_id
            )));
        }
        seen.push(a.question_id);
    }

    let tx = conn.unchecked_transaction()?;
    let mut response_ids = Vec::with_capacity(answers.len());
    for a in answers {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM question_responses WHERE question_id = ? AND student_id = ?",
                (a.question_id, student_id),
                |r| r.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE question_responses SET content = ?, graded = 0 WHERE id = ?",
                    (&a.answer, id),
                )?;
                response_ids.push(id);
            }
            None => {
                tx.execute(
                    "INSERT INTO question_responses(student_id, question_id, content, graded, grader)
                     VALUES(?, ?, ?, 0, 'ai')",
                    (student_id, a.question_id, &a.answer),
                )?;
                response_ids.push(tx.last_insert_rowid());
            }
        }
    }
    tx.commit()?;

    let request = GradingRequest {
        assignment_id,
        student_id,
        questions: join_answers(&questions, answers),
        topics: assemble_topic_context(conn, class_id)?,
    };

    let possible = 10.0 * questions.len() as f64;
    let graded = match grader.grade(&request) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(assignment_id, student_id, "grading call failed: {e}");
            None
        }
    };
    let Some(result) = graded else {
        tracing::info!(assignment_id, student_id, "grading pending");
        return Ok(SubmissionOutcome {
            status: SubmissionStatus::Pending,
            marks: None,
            possible,
            percentage: None,
            feedback: None,
            response_ids,
        });
    };

    let tx = conn.unchecked_transaction()?;
    let existing_grade: Option<i64> = tx
        .query_row(
            "SELECT id FROM assignment_grades WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    match existing_grade {
        Some(id) => {
            tx.execute(
                "UPDATE assignment_grades SET marks = ?, feedback = ? WHERE id = ?",
                (result.assignment_marks, &result.feedback, id),
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO assignment_grades(assignment_id, student_id, marks, feedback)
                 VALUES(?, ?, ?, ?)",
                (assignment_id, student_id, result.assignment_marks, &result.feedback),
            )?;
        }
    }

    for qs in &result.question_scores {
        let updated = tx.execute(
            "UPDATE question_responses SET marks = ?, feedback = ?
             WHERE question_id = ? AND student_id = ?",
            (qs.marks, &qs.feedback, qs.question_id, student_id),
        )?;
        if updated == 0 {
            tracing::warn!(
                question_id = qs.question_id,
                "grading result referenced an unknown question"
            );
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let batch_id: i64 = match tx
        .query_row(
            "SELECT id FROM submission_batches WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
            |r| r.get(0),
        )
        .optional()?
    {
        Some(id) => {
            tx.execute(
                "UPDATE submission_batches SET created_at = ? WHERE id = ?",
                (&now, id),
            )?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO submission_batches(assignment_id, student_id, created_at)
                 VALUES(?, ?, ?)",
                (assignment_id, student_id, &now),
            )?;
            tx.last_insert_rowid()
        }
    };

    tx.execute("DELETE FROM topic_scores WHERE batch_id = ?", [batch_id])?;
    for ts in &result.topic_scores {
        let known: Option<i64> = tx
            .query_row("SELECT id FROM topics WHERE id = ?", [ts.topic_id], |r| r.get(0))
            .optional()?;
        if known.is_none() {
            tracing::warn!(topic_id = ts.topic_id, "grading result referenced an unknown topic");
            continue;
        }
        tx.execute(
            "INSERT INTO topic_scores(topic_id, batch_id, marks) VALUES(?, ?, ?)",
            (ts.topic_id, batch_id, ts.marks),
        )?;
    }

    for id in &response_ids {
        tx.execute("UPDATE question_responses SET graded = 1 WHERE id = ?", [id])?;
    }
    tx.commit()?;

    let percentage = if possible > 0.0 {
        round1(result.assignment_marks / possible * 100.0)
    } else {
        0.0
    };
    Ok(SubmissionOutcome {
        status: SubmissionStatus::Graded,
        marks: Some(result.assignment_marks),
        possible,
        percentage: Some(percentage),
        feedback: result.feedback,
        response_ids,
    })
}

fn load_questions(conn: &Connection, assignment_id: i64) -> Result<Vec<QuestionRow>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT id, content FROM questions WHERE assignment_id = ? ORDER BY id")?;
    let rows = stmt
        .query_map([assignment_id], |r| {
            Ok(QuestionRow {
                id: r.get(0)?,
                content: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn join_answers(questions: &[QuestionRow], answers: &[AnswerInput]) -> Vec<QuestionAnswer> {
    answers
        .iter()
        .filter_map(|a| {
            let q = questions.iter().find(|q| q.id == a.question_id)?;
            Some(QuestionAnswer {
                question_id: q.id,
                question: q.content.clone(),
                answer: a.answer.clone(),
            })
        })
        .collect()
}

/// Collects the class's extracted knowledge graph for the grading prompt:
/// every topic occurring on one of the class's resources, with the key
/// concepts attached within that class.
fn assemble_topic_context(
    conn: &Connection,
    class_id: i64,
) -> Result<Vec<TopicContext>, CoreError> {
    let mut topic_stmt = conn.prepare(
        "SELECT DISTINCT t.id, t.name, t.outline
         FROM topics t
         JOIN occurrences o ON o.topic_id = t.id
         JOIN resources r ON r.id = o.resource_id
         WHERE r.class_id = ?
         ORDER BY t.id",
    )?;
    let topics = topic_stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut concept_stmt = conn.prepare(
        "SELECT k.id, k.name, k.description
         FROM key_concepts k
         JOIN occurrences o ON o.id = k.occurrence_id
         JOIN resources r ON r.id = o.resource_id
         WHERE r.class_id = ? AND o.topic_id = ?
         ORDER BY k.id",
    )?;

    let mut out = Vec::with_capacity(topics.len());
    for (id, name, outline) in topics {
        let key_concepts = concept_stmt
            .query_map((class_id, id), |r| {
                Ok(ConceptContext {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    description: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push(TopicContext {
            id,
            name,
            outline,
            key_concepts,
        });
    }
    Ok(out)
}
