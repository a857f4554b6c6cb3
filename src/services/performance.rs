// src/services/performance.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::StreamExt;

use crate::{
    error::AppError,
    models::{
        performance::{
            QuizPerformanceData, QuizPerformanceResponse, QuizPerformanceStats, ScoreCategory,
            ScoreDistribution, StudentQuizPerformance,
        },
        quiz_attempt::{QuizAttempt, QuizPerformanceFilter},
        student::StudentSummary,
    },
    services::score_category::categorize,
    storage::{Storage, StorageError},
    utils::cancel::CancelFlag,
};

/// Running counters shared by the overall, per-quiz and per-student rollups.
#[derive(Debug, Default)]
struct Tally {
    total: i64,
    completed: i64,
    passed: i64,
    failed: i64,
    in_progress: i64,
    score_sum: i64,
    percentage_sum: f64,
    distribution: ScoreDistribution,
}

impl Tally {
    fn record(&mut self, attempt: &QuizAttempt, category: Option<ScoreCategory>) {
        self.total += 1;
        if !attempt.completed {
            self.in_progress += 1;
            return;
        }
        self.completed += 1;
        if attempt.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.score_sum += attempt.score;
        self.percentage_sum += attempt.percentage;
        if let Some(category) = category {
            self.distribution.add(category);
        }
    }

    fn average_score(&self) -> f64 {
        ratio(self.score_sum as f64, self.completed)
    }

    fn average_percentage(&self) -> f64 {
        ratio(self.percentage_sum, self.completed)
    }

    fn pass_rate(&self) -> f64 {
        ratio(self.passed as f64 * 100.0, self.completed)
    }
}

/// `numerator / count`, or 0 when there is nothing to divide by.
fn ratio(numerator: f64, count: i64) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

#[derive(Debug)]
struct QuizTally {
    topic_id: i64,
    course_id: i64,
    tally: Tally,
    students: HashSet<i64>,
    best_score: Option<i64>,
    worst_score: Option<i64>,
}

#[derive(Debug)]
struct StudentTally {
    class_id: i64,
    tally: Tally,
    highest_score: i64,
    highest_percentage: Option<f64>,
    completed_quizzes: HashSet<i64>,
    passed_quizzes: HashSet<i64>,
}

/// State of one aggregation pass. Never exposed until the pass finishes.
#[derive(Debug, Default)]
struct Accumulator {
    overall: Tally,
    quizzes: BTreeMap<i64, QuizTally>,
    students: BTreeMap<i64, StudentTally>,
}

impl Accumulator {
    fn record(&mut self, attempt: &QuizAttempt) -> Result<(), AppError> {
        attempt
            .check_integrity()
            .map_err(|reason| AppError::Aggregation(format!("quiz attempt {}: {}", attempt.id, reason)))?;

        let category = if attempt.completed {
            Some(categorize(attempt.percentage)?)
        } else {
            None
        };

        self.overall.record(attempt, category);

        let quiz = self.quizzes.entry(attempt.quiz_id).or_insert_with(|| QuizTally {
            topic_id: attempt.topic_id,
            course_id: attempt.course_id,
            tally: Tally::default(),
            students: HashSet::new(),
            best_score: None,
            worst_score: None,
        });
        quiz.tally.record(attempt, category);
        quiz.students.insert(attempt.student_id);
        if attempt.completed {
            quiz.best_score = Some(quiz.best_score.map_or(attempt.score, |s| s.max(attempt.score)));
            quiz.worst_score = Some(quiz.worst_score.map_or(attempt.score, |s| s.min(attempt.score)));
        }

        let student = self
            .students
            .entry(attempt.student_id)
            .or_insert_with(|| StudentTally {
                class_id: attempt.class_id,
                tally: Tally::default(),
                highest_score: 0,
                highest_percentage: None,
                completed_quizzes: HashSet::new(),
                passed_quizzes: HashSet::new(),
            });
        student.tally.record(attempt, category);
        if attempt.completed {
            student.highest_score = student.highest_score.max(attempt.score);
            student.highest_percentage = Some(
                student
                    .highest_percentage
                    .map_or(attempt.percentage, |p| p.max(attempt.percentage)),
            );
            student.completed_quizzes.insert(attempt.quiz_id);
            if attempt.passed {
                student.passed_quizzes.insert(attempt.quiz_id);
            }
        }

        Ok(())
    }

    fn student_ids(&self) -> Vec<i64> {
        self.students.keys().copied().collect()
    }

    fn finish(self, names: &HashMap<i64, String>) -> Result<QuizPerformanceResponse, AppError> {
        let stats = QuizPerformanceStats {
            total_attempts: self.overall.total,
            completed_attempts: self.overall.completed,
            passed_attempts: self.overall.passed,
            failed_attempts: self.overall.failed,
            in_progress_attempts: self.overall.in_progress,
            average_score: self.overall.average_score(),
            average_percentage: self.overall.average_percentage(),
            pass_rate: self.overall.pass_rate(),
            total_students: self.students.len() as i64,
            unique_quizzes: self.quizzes.len() as i64,
            score_distribution: self.overall.distribution,
        };

        let quiz_data = self
            .quizzes
            .into_iter()
            .map(|(quiz_id, quiz)| QuizPerformanceData {
                quiz_id,
                topic_id: quiz.topic_id,
                course_id: quiz.course_id,
                total_attempts: quiz.tally.total,
                completed_attempts: quiz.tally.completed,
                passed_attempts: quiz.tally.passed,
                failed_attempts: quiz.tally.failed,
                unique_students: quiz.students.len() as i64,
                pass_rate: quiz.tally.pass_rate(),
                average_score: quiz.tally.average_score(),
                average_percentage: quiz.tally.average_percentage(),
                best_score: quiz.best_score.unwrap_or(0),
                worst_score: quiz.worst_score.unwrap_or(0),
                score_distribution: quiz.tally.distribution,
            })
            .collect();

        let student_data = self
            .students
            .into_iter()
            .map(|(student_id, student)| -> Result<StudentQuizPerformance, AppError> {
                // Categorized by best demonstrated performance, not the average.
                let score_category = student.highest_percentage.map(categorize).transpose()?;
                Ok(StudentQuizPerformance {
                    student: StudentSummary {
                        id: student_id,
                        full_name: names.get(&student_id).cloned(),
                    },
                    class_id: student.class_id,
                    total_attempts: student.tally.total,
                    quizzes_completed: student.completed_quizzes.len() as i64,
                    quizzes_passed: student.passed_quizzes.len() as i64,
                    total_points: student.tally.score_sum,
                    highest_score: student.highest_score,
                    highest_percentage: student.highest_percentage.unwrap_or(0.0),
                    average_percentage: student.tally.average_percentage(),
                    score_category,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(QuizPerformanceResponse {
            stats,
            quiz_data,
            student_data,
        })
    }
}

fn read_failure(err: StorageError) -> AppError {
    match err {
        StorageError::Decode(msg) => AppError::Aggregation(msg),
        other => {
            tracing::error!("Failed to read quiz attempts: {}", other);
            AppError::from(other)
        }
    }
}

fn cancelled() -> AppError {
    AppError::Cancelled("Quiz performance aggregation was cancelled".to_string())
}

/// Computes quiz performance for every attempt matching `filter`.
///
/// Attempts are consumed in one forward pass; memory grows with the number
/// of distinct students and quizzes, not with the number of attempts.
/// Every storage read is raced against `cancel`, so a stalled read is
/// abandoned as soon as the flag trips. A cancelled or failed pass returns
/// an error and no partial result.
pub async fn aggregate(
    storage: &dyn Storage,
    filter: &QuizPerformanceFilter,
    cancel: &CancelFlag,
) -> Result<QuizPerformanceResponse, AppError> {
    filter.validate()?;

    let mut acc = Accumulator::default();
    let mut attempts = storage.attempts(filter);
    loop {
        let next = cancel
            .run_until_cancelled(attempts.next())
            .await
            .ok_or_else(cancelled)?;
        let Some(row) = next else { break };
        let attempt = row.map_err(read_failure)?;
        acc.record(&attempt)?;
    }
    drop(attempts);

    let students = cancel
        .run_until_cancelled(storage.students_by_ids(&acc.student_ids()))
        .await
        .ok_or_else(cancelled)?
        .map_err(read_failure)?;
    let names: HashMap<i64, String> = students.into_iter().map(|s| (s.id, s.full_name)).collect();

    // The flag may trip after the last read resolved.
    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    let response = acc.finish(&names)?;
    tracing::debug!(
        attempts = response.stats.total_attempts,
        quizzes = response.stats.unique_quizzes,
        students = response.stats.total_students,
        "Quiz performance aggregated"
    );
    Ok(response)
}
