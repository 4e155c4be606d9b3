use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::to_millis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub designation: Option<String>,
    /// `YYYY-MM-DD`
    pub joined_on: Option<String>,
    pub created_at: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    HalfDay,
    Leave,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::HalfDay => "half_day",
            AttendanceStatus::Leave => "leave",
        }
    }
}

/// One row per employee per day, enforced by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub employee_id: ObjectId,
    /// `YYYY-MM-DD`, so lexical order is chronological.
    pub date: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub updated_at: Option<BsonDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub joined_on: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    pub employee_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    /// `YYYY-MM`
    pub month: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmployeeResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub joined_on: Option<String>,
    pub created_at: i64,
}

impl From<Employee> for EmployeeResponse {
    fn from(employee: Employee) -> Self {
        EmployeeResponse {
            id: employee.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: employee.name,
            email: employee.email,
            phone: employee.phone,
            designation: employee.designation,
            joined_on: employee.joined_on,
            created_at: to_millis(employee.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttendanceEntry {
    pub date: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

impl From<AttendanceRecord> for AttendanceEntry {
    fn from(record: AttendanceRecord) -> Self {
        AttendanceEntry {
            date: record.date,
            status: record.status,
            note: record.note,
        }
    }
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct AttendanceSummary {
    pub present: u32,
    pub absent: u32,
    pub half_day: u32,
    pub leave: u32,
    /// Half days count as half a working day.
    pub days_worked: f32,
}

impl AttendanceSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut summary = AttendanceSummary::default();
        for record in records {
            match record.status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Absent => summary.absent += 1,
                AttendanceStatus::HalfDay => summary.half_day += 1,
                AttendanceStatus::Leave => summary.leave += 1,
            }
        }
        summary.days_worked = summary.present as f32 + summary.half_day as f32 * 0.5;
        summary
    }
}

#[derive(Debug, Serialize)]
pub struct AttendanceReport {
    pub employee: EmployeeResponse,
    pub month: String,
    pub records: Vec<AttendanceEntry>,
    pub summary: AttendanceSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: None,
            employee_id: ObjectId::new(),
            date: date.to_string(),
            status,
            note: None,
            updated_at: None,
        }
    }

    #[test]
    fn summary_counts_each_status() {
        let records = vec![
            record("2024-05-01", AttendanceStatus::Present),
            record("2024-05-02", AttendanceStatus::Present),
            record("2024-05-03", AttendanceStatus::HalfDay),
            record("2024-05-04", AttendanceStatus::Absent),
            record("2024-05-05", AttendanceStatus::Leave),
        ];

        let summary = AttendanceSummary::from_records(&records);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.half_day, 1);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.leave, 1);
        assert!((summary.days_worked - 2.5).abs() < f32::EPSILON);
    }

    #[test]
    fn status_uses_snake_case() {
        assert_eq!(serde_json::to_value(AttendanceStatus::HalfDay).unwrap(), "half_day");
        assert_eq!(AttendanceStatus::HalfDay.as_str(), "half_day");
    }
}
