// ==================== OFFLINE COURSES ====================
// Classroom batches managed by admins: course records, enrolled students and
// the fee installments they pay over time.

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use mongodb::ClientSession;

use crate::database::{finish_transaction, is_duplicate_key, MongoDB};
use crate::models::{
    EnrollOfflineStudentRequest, Installment, InstallmentRequest, OfflineCourse, OfflineCourseRequest,
    OfflineCourseResponse, OfflineStudent, OfflineStudentResponse,
};
use crate::utils::{normalize_email, parse_object_id, require_text, AppError, AppResult};

const DEFAULT_PAYMENT_MODE: &str = "cash";

fn non_negative(value: i64, field: &str) -> AppResult<i64> {
    if value < 0 {
        return Err(AppError::BadRequest(format!("{} cannot be negative", field)));
    }
    Ok(value)
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

async fn find_offline_course(db: &MongoDB, id: ObjectId) -> AppResult<OfflineCourse> {
    db.offline_courses()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Offline course"))
}

pub async fn create_course(db: &MongoDB, request: &OfflineCourseRequest) -> AppResult<OfflineCourseResponse> {
    let title = require_text(request.title.as_deref().unwrap_or_default(), "Title")?;
    let fee = non_negative(request.fee.unwrap_or(0), "Fee")?;
    let now = BsonDateTime::now();

    let mut course = OfflineCourse {
        id: None,
        title,
        description: trimmed(&request.description),
        fee,
        duration: trimmed(&request.duration),
        batch_timing: trimmed(&request.batch_timing),
        is_active: request.is_active.unwrap_or(true),
        created_at: Some(now),
        updated_at: Some(now),
    };

    let result = db.offline_courses().insert_one(&course).await?;
    course.id = result.inserted_id.as_object_id();

    log::info!("🏫 Offline course created: {}", course.title);
    Ok(OfflineCourseResponse::from(course))
}

pub async fn list_courses(db: &MongoDB) -> AppResult<Vec<OfflineCourseResponse>> {
    let courses: Vec<OfflineCourse> = db
        .offline_courses()
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(courses.into_iter().map(OfflineCourseResponse::from).collect())
}

pub async fn get_course(db: &MongoDB, id: &str) -> AppResult<OfflineCourseResponse> {
    let course_id = parse_object_id(id, "offline course")?;
    Ok(OfflineCourseResponse::from(find_offline_course(db, course_id).await?))
}

pub(crate) fn course_changes(request: &OfflineCourseRequest) -> AppResult<Document> {
    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(title) = &request.title {
        set.insert("title", require_text(title, "Title")?);
    }
    if let Some(fee) = request.fee {
        set.insert("fee", non_negative(fee, "Fee")?);
    }
    if request.description.is_some() {
        set.insert("description", trimmed(&request.description));
    }
    if request.duration.is_some() {
        set.insert("duration", trimmed(&request.duration));
    }
    if request.batch_timing.is_some() {
        set.insert("batch_timing", trimmed(&request.batch_timing));
    }
    if let Some(active) = request.is_active {
        set.insert("is_active", active);
    }
    Ok(set)
}

pub async fn update_course(db: &MongoDB, id: &str, request: &OfflineCourseRequest) -> AppResult<OfflineCourseResponse> {
    let course_id = parse_object_id(id, "offline course")?;
    let set = course_changes(request)?;

    let updated = db
        .offline_courses()
        .find_one_and_update(doc! { "_id": course_id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Offline course"))?;

    Ok(OfflineCourseResponse::from(updated))
}

async fn delete_course_in_session(db: &MongoDB, session: &mut ClientSession, course_id: ObjectId) -> AppResult<u64> {
    let students = db
        .offline_students()
        .delete_many(doc! { "course_id": course_id })
        .session(&mut *session)
        .await?;

    let course = db
        .offline_courses()
        .delete_one(doc! { "_id": course_id })
        .session(&mut *session)
        .await?;

    if course.deleted_count == 0 {
        return Err(AppError::not_found("Offline course"));
    }
    Ok(students.deleted_count)
}

pub async fn delete_course(db: &MongoDB, id: &str) -> AppResult<()> {
    let course_id = parse_object_id(id, "offline course")?;

    let mut session = db.start_transaction().await?;
    let result = delete_course_in_session(db, &mut session, course_id).await;
    let students = finish_transaction(&mut session, result).await?;

    log::info!("🗑️ Offline course {} deleted with {} students", course_id.to_hex(), students);
    Ok(())
}

/// Builds the student record, validating the opening payment against the fee.
pub(crate) fn new_student(
    course: &OfflineCourse,
    course_id: ObjectId,
    request: &EnrollOfflineStudentRequest,
    now: BsonDateTime,
) -> AppResult<OfflineStudent> {
    let name = require_text(&request.name, "Name")?;
    let email = normalize_email(&request.email)?;
    let total_fee = non_negative(request.total_fee.unwrap_or(course.fee), "Total fee")?;
    let initial = non_negative(request.initial_payment.unwrap_or(0), "Initial payment")?;
    if initial > total_fee {
        return Err(AppError::BadRequest("Initial payment exceeds the total fee".to_string()));
    }

    let installments = if initial > 0 {
        vec![Installment {
            amount: initial,
            mode: trimmed(&request.payment_mode).unwrap_or_else(|| DEFAULT_PAYMENT_MODE.to_string()),
            paid_on: now,
            note: Some("Initial payment".to_string()),
        }]
    } else {
        vec![]
    };

    Ok(OfflineStudent {
        id: None,
        name,
        email,
        phone: trimmed(&request.phone),
        address: trimmed(&request.address),
        course_id,
        total_fee,
        paid_fee: initial,
        installments,
        enrolled_at: Some(now),
    })
}

/// Matches an existing enrollment of `email` in the course. `email` must already be normalized.
pub(crate) fn duplicate_enrollment_filter(course_id: ObjectId, email: &str) -> Document {
    doc! { "course_id": course_id, "email": email }
}

fn already_enrolled_error(email: &str) -> AppError {
    AppError::Conflict(format!("{} is already enrolled in this course", email))
}

pub async fn enroll_student(
    db: &MongoDB,
    course_id: &str,
    request: &EnrollOfflineStudentRequest,
) -> AppResult<OfflineStudentResponse> {
    let course_id = parse_object_id(course_id, "offline course")?;
    let course = find_offline_course(db, course_id).await?;
    if !course.is_active {
        return Err(AppError::BadRequest("This offline course is not accepting enrollments".to_string()));
    }

    let mut student = new_student(&course, course_id, request, BsonDateTime::now())?;
    let already_enrolled = db
        .offline_students()
        .count_documents(duplicate_enrollment_filter(course_id, &student.email))
        .await?;
    if already_enrolled > 0 {
        return Err(already_enrolled_error(&student.email));
    }

    let result = match db.offline_students().insert_one(&student).await {
        Ok(result) => result,
        Err(e) if is_duplicate_key(&e) => return Err(already_enrolled_error(&student.email)),
        Err(e) => return Err(e.into()),
    };
    student.id = result.inserted_id.as_object_id();

    log::info!("🧑‍🎓 {} enrolled in offline course {}", student.email, course.title);
    Ok(OfflineStudentResponse::from(student))
}

pub async fn list_students(db: &MongoDB, course_id: &str) -> AppResult<Vec<OfflineStudentResponse>> {
    let course_id = parse_object_id(course_id, "offline course")?;
    find_offline_course(db, course_id).await?;

    let students: Vec<OfflineStudent> = db
        .offline_students()
        .find(doc! { "course_id": course_id })
        .sort(doc! { "enrolled_at": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(students.into_iter().map(OfflineStudentResponse::from).collect())
}

/// Filter that only matches while `amount` still fits in the outstanding balance.
pub(crate) fn installment_guard(student_id: ObjectId, amount: i64) -> Document {
    doc! {
        "_id": student_id,
        "$expr": { "$lte": [ { "$add": ["$paid_fee", amount] }, "$total_fee" ] },
    }
}

pub async fn record_installment(
    db: &MongoDB,
    student_id: &str,
    request: &InstallmentRequest,
) -> AppResult<OfflineStudentResponse> {
    let student_id = parse_object_id(student_id, "student")?;
    let students = db.offline_students();

    let student = students
        .find_one(doc! { "_id": student_id })
        .await?
        .ok_or_else(|| AppError::not_found("Student"))?;
    student.check_installment(request.amount).map_err(AppError::BadRequest)?;

    let installment = Installment {
        amount: request.amount,
        mode: trimmed(&request.mode).unwrap_or_else(|| DEFAULT_PAYMENT_MODE.to_string()),
        paid_on: BsonDateTime::now(),
        note: trimmed(&request.note),
    };

    let updated = students
        .find_one_and_update(
            installment_guard(student_id, request.amount),
            doc! {
                "$inc": { "paid_fee": request.amount },
                "$push": { "installments": to_bson(&installment)? },
            },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Balance changed while recording the installment, reload and retry".to_string()))?;

    log::info!(
        "💰 Installment of {} recorded for {} (balance {})",
        request.amount,
        updated.email,
        updated.balance()
    );
    Ok(OfflineStudentResponse::from(updated))
}

pub async fn delete_student(db: &MongoDB, student_id: &str) -> AppResult<()> {
    let student_id = parse_object_id(student_id, "student")?;
    let result = db.offline_students().delete_one(doc! { "_id": student_id }).await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Student"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(fee: i64) -> OfflineCourse {
        OfflineCourse {
            id: Some(ObjectId::new()),
            title: "Full-stack bootcamp".into(),
            description: None,
            fee,
            duration: Some("6 months".into()),
            batch_timing: None,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn request(initial: Option<i64>) -> EnrollOfflineStudentRequest {
        EnrollOfflineStudentRequest {
            name: " Arjun ".into(),
            email: "Arjun@Example.com".into(),
            phone: None,
            address: Some("   ".into()),
            total_fee: None,
            initial_payment: initial,
            payment_mode: None,
        }
    }

    #[test]
    fn student_inherits_course_fee_and_records_initial_payment() {
        let c = course(20_000);
        let student = new_student(&c, c.id.unwrap(), &request(Some(5_000)), BsonDateTime::now()).unwrap();

        assert_eq!(student.name, "Arjun");
        assert_eq!(student.email, "arjun@example.com");
        assert_eq!(student.address, None);
        assert_eq!(student.total_fee, 20_000);
        assert_eq!(student.paid_fee, 5_000);
        assert_eq!(student.balance(), 15_000);
        assert_eq!(student.installments.len(), 1);
        assert_eq!(student.installments[0].mode, "cash");
    }

    #[test]
    fn no_installment_without_initial_payment() {
        let c = course(20_000);
        let student = new_student(&c, c.id.unwrap(), &request(None), BsonDateTime::now()).unwrap();
        assert_eq!(student.paid_fee, 0);
        assert!(student.installments.is_empty());
    }

    #[test]
    fn initial_payment_cannot_exceed_fee() {
        let c = course(1_000);
        let err = new_student(&c, c.id.unwrap(), &request(Some(1_001)), BsonDateTime::now()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn negative_fee_is_rejected() {
        let changes = course_changes(&OfflineCourseRequest {
            title: None,
            description: None,
            fee: Some(-1),
            duration: None,
            batch_timing: None,
            is_active: None,
        });
        assert!(changes.is_err());
    }

    #[test]
    fn installment_guard_bounds_paid_fee_by_total() {
        let id = ObjectId::new();
        let guard = installment_guard(id, 500);
        assert_eq!(guard.get_object_id("_id").unwrap(), id);
        assert_eq!(
            guard.get_document("$expr").unwrap(),
            &doc! { "$lte": [ { "$add": ["$paid_fee", 500_i64] }, "$total_fee" ] }
        );
    }

    #[test]
    fn duplicate_filter_matches_normalized_email_per_course() {
        let c = course(20_000);
        let course_id = c.id.unwrap();
        let student = new_student(&c, course_id, &request(None), BsonDateTime::now()).unwrap();

        let filter = duplicate_enrollment_filter(course_id, &student.email);
        assert_eq!(filter, doc! { "course_id": course_id, "email": "arjun@example.com" });
        assert!(matches!(already_enrolled_error(&student.email), AppError::Conflict(m) if m.contains("arjun@example.com")));
    }
}
