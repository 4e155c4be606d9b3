use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::to_millis;

/// Classroom course sold at the front desk rather than online.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineCourse {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: Option<String>,
    pub fee: i64,
    pub duration: Option<String>,
    pub batch_timing: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    pub amount: i64,
    /// cash, upi, card, bank_transfer...
    pub mode: String,
    pub paid_on: BsonDateTime,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineStudent {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub course_id: ObjectId,
    pub total_fee: i64,
    #[serde(default)]
    pub paid_fee: i64,
    #[serde(default)]
    pub installments: Vec<Installment>,
    pub enrolled_at: Option<BsonDateTime>,
}

impl OfflineStudent {
    pub fn balance(&self) -> i64 {
        self.total_fee - self.paid_fee
    }

    /// Validates an installment against the outstanding balance.
    pub fn check_installment(&self, amount: i64) -> Result<(), String> {
        if amount <= 0 {
            return Err("Installment amount must be positive".to_string());
        }
        if amount > self.balance() {
            return Err(format!(
                "Installment of {} exceeds the outstanding balance of {}",
                amount,
                self.balance()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct OfflineCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fee: Option<i64>,
    pub duration: Option<String>,
    pub batch_timing: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollOfflineStudentRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Defaults to the course fee.
    pub total_fee: Option<i64>,
    /// Amount collected at enrollment, recorded as the first installment.
    pub initial_payment: Option<i64>,
    pub payment_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InstallmentRequest {
    pub amount: i64,
    pub mode: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OfflineCourseResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub fee: i64,
    pub duration: Option<String>,
    pub batch_timing: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

impl From<OfflineCourse> for OfflineCourseResponse {
    fn from(course: OfflineCourse) -> Self {
        OfflineCourseResponse {
            id: course.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: course.title,
            description: course.description,
            fee: course.fee,
            duration: course.duration,
            batch_timing: course.batch_timing,
            is_active: course.is_active,
            created_at: to_millis(course.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstallmentInfo {
    pub amount: i64,
    pub mode: String,
    pub paid_on: i64,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OfflineStudentResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub course_id: String,
    pub total_fee: i64,
    pub paid_fee: i64,
    pub balance: i64,
    pub installments: Vec<InstallmentInfo>,
    pub enrolled_at: i64,
}

impl From<OfflineStudent> for OfflineStudentResponse {
    fn from(student: OfflineStudent) -> Self {
        let balance = student.balance();
        OfflineStudentResponse {
            id: student.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: student.name,
            email: student.email,
            phone: student.phone,
            address: student.address,
            course_id: student.course_id.to_hex(),
            total_fee: student.total_fee,
            paid_fee: student.paid_fee,
            balance,
            installments: student
                .installments
                .into_iter()
                .map(|i| InstallmentInfo {
                    amount: i.amount,
                    mode: i.mode,
                    paid_on: i.paid_on.timestamp_millis(),
                    note: i.note,
                })
                .collect(),
            enrolled_at: to_millis(student.enrolled_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(total: i64, paid: i64) -> OfflineStudent {
        OfflineStudent {
            id: None,
            name: "Meera".into(),
            email: "meera@example.com".into(),
            phone: None,
            address: None,
            course_id: ObjectId::new(),
            total_fee: total,
            paid_fee: paid,
            installments: vec![],
            enrolled_at: None,
        }
    }

    #[test]
    fn installments_cannot_overpay() {
        let s = student(10_000, 7_500);
        assert_eq!(s.balance(), 2_500);
        assert!(s.check_installment(2_500).is_ok());
        assert!(s.check_installment(2_501).is_err());
    }

    #[test]
    fn installments_must_be_positive() {
        let s = student(10_000, 0);
        assert!(s.check_installment(0).is_err());
        assert!(s.check_installment(-5).is_err());
    }
}
