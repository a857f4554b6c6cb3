// src/storage/memory.rs

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};

use crate::models::{
    course::{Course, CourseSummary},
    enrollment::{Enrollment, EnrollmentChange, EnrollmentCounts, EnrollmentStatus, StudentEnrollment},
    quiz_attempt::{QuizAttempt, QuizPerformanceFilter},
    student::Student,
};

use super::{Storage, StorageError};

/// Attempts copied out per read-lock acquisition while streaming.
const ATTEMPT_CHUNK: usize = 256;

#[derive(Default)]
struct Tables {
    courses: BTreeMap<i64, Course>,
    students: BTreeMap<i64, Student>,
    enrollments: BTreeMap<(i64, i64), Enrollment>,
    attempts: BTreeMap<i64, QuizAttempt>,
    next_enrollment_id: i64,
}

/// In-process storage with the same constraints as the Postgres schema:
/// one enrollment per `(student_id, course_id)` and existing referenced rows.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Unavailable("memory tables poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Unavailable("memory tables poisoned".to_string()))
    }

    pub fn insert_course(
        &self,
        id: i64,
        title: &str,
        is_active: bool,
    ) -> Result<(), StorageError> {
        let course = Course {
            id,
            title: title.to_string(),
            description: None,
            course_level_id: None,
            is_active,
            created_at: Utc::now(),
        };
        self.write()?.courses.insert(id, course);
        Ok(())
    }

    pub fn set_course_active(&self, id: i64, is_active: bool) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let course = tables
            .courses
            .get_mut(&id)
            .ok_or_else(|| StorageError::ForeignKeyViolation(format!("course {id}")))?;
        course.is_active = is_active;
        Ok(())
    }

    pub fn insert_student(&self, student: Student) -> Result<(), StorageError> {
        self.write()?.students.insert(student.id, student);
        Ok(())
    }

    /// Stores an attempt, replacing any attempt with the same id.
    pub fn insert_attempt(&self, attempt: QuizAttempt) -> Result<(), StorageError> {
        self.write()?.attempts.insert(attempt.id, attempt);
        Ok(())
    }

    /// Up to `ATTEMPT_CHUNK` matching attempts with ids in `(after, upper]`,
    /// ordered by id. The lock is released before the caller sees them.
    fn attempt_chunk(
        &self,
        filter: &QuizPerformanceFilter,
        after: i64,
        upper: i64,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .attempts
            .range((Bound::Excluded(after), Bound::Included(upper)))
            .map(|(_, attempt)| attempt)
            .filter(|attempt| filter.matches(attempt))
            .take(ATTEMPT_CHUNK)
            .cloned()
            .collect())
    }

    /// Total number of enrollment rows across all students.
    pub fn enrollment_total(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.enrollments.len())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn student_enrollments(
        &self,
        student_id: i64,
    ) -> Result<Vec<StudentEnrollment>, StorageError> {
        let tables = self.read()?;
        let mut rows = tables
            .enrollments
            .values()
            .filter(|e| e.student_id == student_id)
            .map(|e| {
                let course = tables.courses.get(&e.course_id).ok_or_else(|| {
                    StorageError::Decode(format!(
                        "enrollment {} points at missing course {}",
                        e.id, e.course_id
                    ))
                })?;
                Ok(StudentEnrollment {
                    enrollment: e.clone(),
                    course: CourseSummary::from(course),
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        rows.sort_by(|a, b| {
            b.enrollment
                .updated_at
                .cmp(&a.enrollment.updated_at)
                .then_with(|| b.enrollment.id.cmp(&a.enrollment.id))
        });
        Ok(rows)
    }

    async fn active_courses(&self) -> Result<Vec<Course>, StorageError> {
        Ok(self
            .read()?
            .courses
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn count_active_courses(&self) -> Result<i64, StorageError> {
        Ok(self.read()?.courses.values().filter(|c| c.is_active).count() as i64)
    }

    async fn enrollment_counts(&self, student_id: i64) -> Result<EnrollmentCounts, StorageError> {
        let tables = self.read()?;
        let mut counts = EnrollmentCounts::default();
        for enrollment in tables.enrollments.values().filter(|e| e.student_id == student_id) {
            counts.total += 1;
            match enrollment.status {
                EnrollmentStatus::Enrolled => counts.enrolled += 1,
                EnrollmentStatus::Completed => counts.completed += 1,
                EnrollmentStatus::NotEnrolled => {}
            }
        }
        Ok(counts)
    }

    async fn upsert_enrollment(
        &self,
        change: &EnrollmentChange,
    ) -> Result<Option<Enrollment>, StorageError> {
        // The write lock is the critical section: lookup and write happen under it.
        let mut tables = self.write()?;

        if !tables.students.contains_key(&change.student_id) {
            return Err(StorageError::ForeignKeyViolation(format!(
                "student {} does not exist",
                change.student_id
            )));
        }
        if !tables.courses.contains_key(&change.course_id) {
            return Err(StorageError::ForeignKeyViolation(format!(
                "course {} does not exist",
                change.course_id
            )));
        }

        let key = (change.student_id, change.course_id);
        if let Some(existing) = tables.enrollments.get_mut(&key) {
            if !change.policy.permits(existing.status, change.status) {
                return Ok(None);
            }
            existing.apply(change);
            return Ok(Some(existing.clone()));
        }

        tables.next_enrollment_id += 1;
        let created = Enrollment::create(tables.next_enrollment_id, change);
        tables.enrollments.insert(key, created.clone());
        Ok(Some(created))
    }

    fn attempts<'a>(
        &'a self,
        filter: &'a QuizPerformanceFilter,
    ) -> BoxStream<'a, Result<QuizAttempt, StorageError>> {
        // Rows inserted after the pass starts are beyond `upper` and not seen.
        let upper = match self.read() {
            Ok(tables) => tables.attempts.keys().next_back().copied(),
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        let Some(upper) = upper else {
            return stream::empty().boxed();
        };

        stream::unfold(Some(i64::MIN), move |cursor| async move {
            let Some(after) = cursor else {
                return None;
            };
            match self.attempt_chunk(filter, after, upper) {
                Ok(chunk) if chunk.is_empty() => None,
                Ok(chunk) => {
                    let next = chunk.last().map(|a| a.id).filter(|_| chunk.len() == ATTEMPT_CHUNK);
                    let rows: Vec<Result<QuizAttempt, StorageError>> = chunk.into_iter().map(Ok).collect();
                    Some((rows, next))
                }
                Err(err) => Some((vec![Err(err)], None)),
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn students_by_ids(&self, ids: &[i64]) -> Result<Vec<Student>, StorageError> {
        let tables = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.students.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enrollment::TransitionPolicy;

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.insert_course(1, "Algebra", true).unwrap();
        storage
            .insert_student(Student {
                id: 5,
                full_name: "Ada".into(),
                school_id: Some(1),
                class_id: Some(2),
            })
            .unwrap();
        storage
    }

    fn change(student_id: i64, course_id: i64) -> EnrollmentChange {
        EnrollmentChange {
            student_id,
            course_id,
            status: EnrollmentStatus::Enrolled,
            progress_percentage: None,
            policy: TransitionPolicy::Permissive,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_rejects_unknown_references() {
        let storage = seeded();
        let missing_course = storage.upsert_enrollment(&change(5, 99)).await;
        assert!(matches!(missing_course, Err(StorageError::ForeignKeyViolation(_))));

        let missing_student = storage.upsert_enrollment(&change(6, 1)).await;
        assert!(matches!(missing_student, Err(StorageError::ForeignKeyViolation(_))));
    }

    #[tokio::test]
    async fn upsert_reuses_the_row_for_a_pair() {
        let storage = seeded();
        let first = storage.upsert_enrollment(&change(5, 1)).await.unwrap().unwrap();
        let second = storage.upsert_enrollment(&change(5, 1)).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(storage.enrollment_total().unwrap(), 1);
    }

    fn attempt(id: i64, class_id: i64) -> QuizAttempt {
        QuizAttempt {
            id,
            student_id: 5,
            quiz_id: 1,
            topic_id: 1,
            course_id: 1,
            course_level_id: 1,
            school_id: 1,
            class_id,
            score: 5,
            max_score: 10,
            percentage: 50.0,
            completed: true,
            passed: true,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn attempts_stream_across_chunks_in_id_order() {
        let storage = seeded();
        // Inserted out of order; every third attempt belongs to class 2
        for id in (1..=700).rev() {
            let class_id = if id % 3 == 0 { 2 } else { 1 };
            storage.insert_attempt(attempt(id, class_id)).unwrap();
        }

        let all: Vec<i64> = storage
            .attempts(&QuizPerformanceFilter::default())
            .map(|row| row.unwrap().id)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(all, (1..=700).collect::<Vec<_>>());

        let filter = QuizPerformanceFilter::for_class(2);
        let class_two: Vec<i64> = storage
            .attempts(&filter)
            .map(|row| row.unwrap().id)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(class_two, (1..=700).filter(|id| id % 3 == 0).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn attempts_inserted_mid_pass_are_not_streamed() {
        let storage = seeded();
        for id in 1..=(ATTEMPT_CHUNK as i64 + 1) {
            storage.insert_attempt(attempt(id, 1)).unwrap();
        }

        let filter = QuizPerformanceFilter::default();
        let mut rows = storage.attempts(&filter);
        let first = rows.next().await.unwrap().unwrap();
        assert_eq!(first.id, 1);

        storage.insert_attempt(attempt(10_000, 1)).unwrap();
        let mut seen = 1;
        while let Some(row) = rows.next().await {
            assert!(row.unwrap().id <= ATTEMPT_CHUNK as i64 + 1);
            seen += 1;
        }
        assert_eq!(seen, ATTEMPT_CHUNK + 1);
    }

    #[tokio::test]
    async fn inactive_courses_are_not_counted() {
        let storage = seeded();
        storage.insert_course(2, "Geometry", false).unwrap();
        assert_eq!(storage.count_active_courses().await.unwrap(), 1);
        assert_eq!(storage.active_courses().await.unwrap().len(), 1);
    }
}
