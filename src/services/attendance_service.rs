use chrono::{Datelike, NaiveDate, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::ClientSession;

use crate::database::{finish_transaction, is_duplicate_key, MongoDB};
use crate::models::{
    AttendanceEntry, AttendanceRecord, AttendanceReport, AttendanceSummary, CreateEmployeeRequest, Employee,
    EmployeeResponse, MarkAttendanceRequest,
};
use crate::utils::{normalize_email, parse_object_id, require_text, AppError, AppResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical `YYYY-MM-DD` form of `raw`.
pub fn parse_day(raw: &str) -> AppResult<String> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// `[first day, first day of next month)` for a `YYYY-MM` month.
pub fn month_bounds(month: &str) -> AppResult<(String, String)> {
    let invalid = || AppError::BadRequest(format!("Invalid month '{}', expected YYYY-MM", month));
    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), DATE_FORMAT).map_err(|_| invalid())?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .ok_or_else(invalid)?;

    Ok((first.format(DATE_FORMAT).to_string(), next.format(DATE_FORMAT).to_string()))
}

fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

async fn find_employee(db: &MongoDB, id: ObjectId) -> AppResult<Employee> {
    db.employees()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Employee"))
}

pub async fn create_employee(db: &MongoDB, request: &CreateEmployeeRequest) -> AppResult<EmployeeResponse> {
    let joined_on = match request.joined_on.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => Some(parse_day(raw)?),
        None => None,
    };

    let mut employee = Employee {
        id: None,
        name: require_text(&request.name, "Name")?,
        email: normalize_email(&request.email)?,
        phone: request.phone.clone(),
        designation: request.designation.clone(),
        joined_on,
        created_at: Some(BsonDateTime::now()),
    };

    let result = db.employees().insert_one(&employee).await?;
    employee.id = result.inserted_id.as_object_id();

    log::info!("👷 Employee added: {}", employee.name);
    Ok(EmployeeResponse::from(employee))
}

pub async fn list_employees(db: &MongoDB) -> AppResult<Vec<EmployeeResponse>> {
    let employees: Vec<Employee> = db
        .employees()
        .find(doc! {})
        .sort(doc! { "name": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(employees.into_iter().map(EmployeeResponse::from).collect())
}

async fn delete_employee_in_session(db: &MongoDB, session: &mut ClientSession, employee_id: ObjectId) -> AppResult<()> {
    db.attendance()
        .delete_many(doc! { "employee_id": employee_id })
        .session(&mut *session)
        .await?;

    let deleted = db
        .employees()
        .delete_one(doc! { "_id": employee_id })
        .session(&mut *session)
        .await?;

    if deleted.deleted_count == 0 {
        return Err(AppError::not_found("Employee"));
    }
    Ok(())
}

pub async fn delete_employee(db: &MongoDB, id: &str) -> AppResult<()> {
    let employee_id = parse_object_id(id, "employee")?;

    let mut session = db.start_transaction().await?;
    let result = delete_employee_in_session(db, &mut session, employee_id).await;
    finish_transaction(&mut session, result).await?;

    log::info!("🗑️ Employee {} and their attendance removed", employee_id.to_hex());
    Ok(())
}

/// One record per employee per day: marking again overwrites the status.
pub async fn mark_attendance(db: &MongoDB, request: &MarkAttendanceRequest) -> AppResult<AttendanceEntry> {
    let employee_id = parse_object_id(&request.employee_id, "employee")?;
    let date = parse_day(&request.date)?;
    find_employee(db, employee_id).await?;

    let filter = doc! { "employee_id": employee_id, "date": &date };
    let update = doc! { "$set": {
        "status": request.status.as_str(),
        "note": request.note.clone(),
        "updated_at": BsonDateTime::now(),
    }};

    let upserted = db
        .attendance()
        .update_one(filter.clone(), update.clone())
        .upsert(true)
        .await;

    match upserted {
        Ok(_) => {}
        // Two concurrent upserts for the same day: the loser retries as a plain update
        Err(e) if is_duplicate_key(&e) => {
            db.attendance().update_one(filter, update).await?;
        }
        Err(e) => return Err(e.into()),
    }

    log::debug!("📅 Attendance {} for {} on {}", request.status.as_str(), employee_id.to_hex(), date);
    Ok(AttendanceEntry {
        date,
        status: request.status,
        note: request.note.clone(),
    })
}

pub async fn monthly_report(db: &MongoDB, employee_id: &str, month: Option<&str>) -> AppResult<AttendanceReport> {
    let employee_id = parse_object_id(employee_id, "employee")?;
    let employee = find_employee(db, employee_id).await?;

    let month = month
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(current_month);
    let (from, until) = month_bounds(&month)?;

    let records: Vec<AttendanceRecord> = db
        .attendance()
        .find(doc! { "employee_id": employee_id, "date": { "$gte": &from, "$lt": &until } })
        .sort(doc! { "date": 1 })
        .await?
        .try_collect()
        .await?;

    let summary = AttendanceSummary::from_records(&records);
    Ok(AttendanceReport {
        employee: EmployeeResponse::from(employee),
        month,
        records: records.into_iter().map(AttendanceEntry::from).collect(),
        summary,
    })
}
