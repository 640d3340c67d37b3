use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::CoreError;

/// Half-up rounding to one decimal, used on every user-facing percentage.
pub fn round1(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Recomputes a student's assignment grade as the sum of marked responses.
///
/// Responses whose marks are NULL (submitted but not yet graded) stay out
/// of the sum rather than counting as zero. The grade row is created on
/// first use; on later recomputes only marks change, so grader feedback on
/// the grade survives per-question mark edits.
pub fn recompute_assignment_grade(
    conn: &Connection,
    assignment_id: i64,
    student_id: i64,
) -> Result<f64, CoreError> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(qr.marks), 0.0)
         FROM question_responses qr
         JOIN questions q ON q.id = qr.question_id
         WHERE q.assignment_id = ? AND qr.student_id = ? AND qr.marks IS NOT NULL",
        (assignment_id, student_id),
        |r| r.get(0),
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM assignment_grades WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute("UPDATE assignment_grades SET marks = ? WHERE id = ?", (total, id))?;
        }
        None => {
            conn.execute(
                "INSERT INTO assignment_grades(assignment_id, student_id, marks) VALUES(?, ?, ?)",
                (assignment_id, student_id, total),
            )?;
        }
    }
    Ok(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope {
    /// Averages across every graded student (the teacher dashboard).
    ClassWide,
    /// One student's own grades.
    Student(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPoint {
    pub assignment_id: i64,
    pub title: String,
    pub average_marks: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicAverage {
    pub topic_id: i64,
    pub topic_name: String,
    pub average_marks: f64,
    pub average_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub overall_average: Option<f64>,
    pub assignments: Vec<AssignmentPoint>,
    pub top_topics: Vec<TopicAverage>,
    pub lowest_topics: Vec<TopicAverage>,
}

/// Class performance statistics on the percentage scale.
///
/// Each graded assignment contributes a point at `marks / (10 * question
/// count)`. Zero-question assignments chart at 0% but are left out of the
/// overall average so they cannot drag it down. Topic rankings average the
/// per-batch topic scores across the class's assignments: best three
/// descending, worst three ascending. A class with nothing graded yields
/// `overall_average = None` and empty lists.
pub fn class_statistics(
    conn: &Connection,
    class_id: i64,
    scope: StatsScope,
) -> Result<ClassStatistics, CoreError> {
    let known: Option<i64> = conn
        .query_row("SELECT id FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if known.is_none() {
        return Err(CoreError::not_found("class", class_id));
    }

    let mut assignment_stmt = conn.prepare(
        "SELECT a.id, a.title,
                (SELECT COUNT(*) FROM questions q WHERE q.assignment_id = a.id)
         FROM assignments a
         WHERE a.class_id = ?
         ORDER BY a.id",
    )?;
    let assignment_rows = assignment_stmt
        .query_map([class_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut assignments = Vec::new();
    let mut percentages = Vec::new();
    for (assignment_id, title, question_count) in assignment_rows {
        let average = match scope {
            StatsScope::ClassWide => conn
                .query_row(
                    "SELECT AVG(marks) FROM assignment_grades WHERE assignment_id = ?",
                    [assignment_id],
                    |r| r.get::<_, Option<f64>>(0),
                )?,
            StatsScope::Student(student_id) => conn
                .query_row(
                    "SELECT marks FROM assignment_grades
                     WHERE assignment_id = ? AND student_id = ?",
                    (assignment_id, student_id),
                    |r| r.get::<_, f64>(0),
                )
                .optional()?,
        };
        let Some(average_marks) = average else {
            continue;
        };
        let possible = 10.0 * question_count as f64;
        let percentage = if possible > 0.0 {
            average_marks / possible * 100.0
        } else {
            0.0
        };
        if possible > 0.0 {
            percentages.push(percentage);
        }
        assignments.push(AssignmentPoint {
            assignment_id,
            title,
            average_marks: round1(average_marks),
            percentage: round1(percentage),
        });
    }

    let overall_average = if percentages.is_empty() {
        None
    } else {
        Some(round1(percentages.iter().sum::<f64>() / percentages.len() as f64))
    };

    let ranked = topic_rankings(conn, class_id, scope)?;
    let top_topics: Vec<TopicAverage> = ranked.iter().take(3).cloned().collect();
    let take = ranked.len().min(3);
    let lowest_topics: Vec<TopicAverage> =
        ranked.iter().rev().take(take).cloned().collect();

    Ok(ClassStatistics {
        overall_average,
        assignments,
        top_topics,
        lowest_topics,
    })
}

fn topic_rankings(
    conn: &Connection,
    class_id: i64,
    scope: StatsScope,
) -> Result<Vec<TopicAverage>, CoreError> {
    let sql_class_wide = "SELECT ts.topic_id, t.name, AVG(ts.marks)
         FROM topic_scores ts
         JOIN submission_batches b ON b.id = ts.batch_id
         JOIN assignments a ON a.id = b.assignment_id
         JOIN topics t ON t.id = ts.topic_id
         WHERE a.class_id = ?
         GROUP BY ts.topic_id, t.name
         ORDER BY AVG(ts.marks) DESC, t.name ASC";
    let sql_student = "SELECT ts.topic_id, t.name, AVG(ts.marks)
         FROM topic_scores ts
         JOIN submission_batches b ON b.id = ts.batch_id
         JOIN assignments a ON a.id = b.assignment_id
         JOIN topics t ON t.id = ts.topic_id
         WHERE a.class_id = ? AND b.student_id = ?
         GROUP BY ts.topic_id, t.name
         ORDER BY AVG(ts.marks) DESC, t.name ASC";

    let map_row = |r: &rusqlite::Row<'_>| {
        let average: f64 = r.get(2)?;
        Ok(TopicAverage {
            topic_id: r.get(0)?,
            topic_name: r.get(1)?,
            average_marks: round1(average),
            average_percent: round1(average * 10.0),
        })
    };

    let rows = match scope {
        StatsScope::ClassWide => {
            let mut stmt = conn.prepare(sql_class_wide)?;
            let rows = stmt
                .query_map([class_id], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        StatsScope::Student(student_id) => {
            let mut stmt = conn.prepare(sql_student)?;
            let rows = stmt
                .query_map((class_id, student_id), map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}
