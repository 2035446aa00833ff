//! Creation payloads, one per request kind.
//!
//! Each kind has its own input struct and serializer producing the nested
//! JSON shape the backend expects. [`RequestPayload`] ties them together so
//! every kind is matched with exactly one endpoint and one body shape.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::request::{ExpenseType, RequestType};
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::{
    validate_amount, validate_date_range, validate_quantity, validate_required, validate_time,
};

// ============================================================================
// Leave
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    /// 有給休暇
    #[serde(alias = "annual")]
    Paid,
    Sick,
    /// 代休
    Compensatory,
    /// 振替休日 taken before the matching holiday work
    CompensatoryAdvance,
    Special,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaveRequest {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: f64,
    #[serde(default)]
    pub hours: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub handover_notes: Option<String>,
}

// ============================================================================
// Overtime
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OvertimeType {
    Early,
    Overtime,
    Holiday,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OvertimeRequest {
    pub work_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    /// Break in hours
    #[serde(default)]
    pub break_time: f64,
    pub total_hours: f64,
    pub overtime_type: OvertimeType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
}

// ============================================================================
// Expense (advance payment / reimbursement) and settlement
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseLine {
    #[serde(default)]
    pub account_code: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default = "default_tax_type")]
    pub tax_type: String,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseRequest {
    pub expense_type: ExpenseType,
    pub purpose: String,
    /// Used only when there are no lines; otherwise the lines are summed
    #[serde(default)]
    pub total_amount: i64,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub occurred_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expense_lines: Vec<ExpenseLine>,
}

impl ExpenseRequest {
    /// Sum of the lines, or the entered total when there are none
    pub fn total(&self) -> Result<i64, ApiError> {
        if self.expense_lines.is_empty() {
            Ok(self.total_amount)
        } else {
            sum_amounts(self.expense_lines.iter().map(|l| l.amount))
        }
    }
}

/// Receipt line used by reimbursements and settlements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptLine {
    pub date: NaiveDate,
    pub item: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default = "default_tax_type")]
    pub tax_type: String,
    pub amount: i64,
}

fn default_tax_type() -> String {
    "included".to_string()
}

const TOTAL_TOO_LARGE: &str = "合計金額が大きすぎます";

fn sum_amounts(mut amounts: impl Iterator<Item = i64>) -> Result<i64, ApiError> {
    amounts
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| ApiError::validation_field("total_amount", TOTAL_TOO_LARGE))
}

fn lines_total(lines: &[ReceiptLine]) -> Result<i64, ApiError> {
    sum_amounts(lines.iter().map(|l| l.amount))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementRequest {
    /// Id of the approved advance payment being settled
    pub advance_payment_request_id: String,
    pub settlement_date: NaiveDate,
    pub advance_payment_amount: i64,
    #[serde(default)]
    pub applicant_name: String,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub application_date: Option<NaiveDate>,
    #[serde(default)]
    pub received_date: Option<NaiveDate>,
    #[serde(default)]
    pub expense_lines: Vec<ReceiptLine>,
}

impl SettlementRequest {
    pub fn total(&self) -> Result<i64, ApiError> {
        lines_total(&self.expense_lines)
    }

    /// Advance minus spent; negative when the employee paid extra
    pub fn balance(&self) -> Result<i64, ApiError> {
        self.advance_payment_amount
            .checked_sub(self.total()?)
            .ok_or_else(|| ApiError::validation_field("balance_amount", TOTAL_TOO_LARGE))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReimbursementRequest {
    pub applicant_name: String,
    pub application_date: NaiveDate,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub expense_lines: Vec<ReceiptLine>,
}

impl ReimbursementRequest {
    pub fn total(&self) -> Result<i64, ApiError> {
        lines_total(&self.expense_lines)
    }
}

// ============================================================================
// Holiday work
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HolidayType {
    Saturday,
    Sunday,
    Holiday,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkDuration {
    #[default]
    Full,
    Half,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompensatoryLeave {
    Yes,
    #[default]
    No,
    Undecided,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HolidayWorkRequest {
    pub application_date: NaiveDate,
    #[serde(default)]
    pub applicant_name: String,
    pub work_date: NaiveDate,
    pub holiday_type: HolidayType,
    #[serde(default)]
    pub work_duration: WorkDuration,
    #[serde(default)]
    pub work_reasons: Vec<String>,
    #[serde(default)]
    pub work_reason_detail: String,
    #[serde(default)]
    pub compensatory_leave: CompensatoryLeave,
    #[serde(default)]
    pub compensatory_leave_date: Option<NaiveDate>,
    #[serde(default)]
    pub compensatory_leave_duration: WorkDuration,
    #[serde(default)]
    pub work_location: String,
    #[serde(default)]
    pub work_content: String,
}

// ============================================================================
// Construction daily report
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub category: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OwnVehicle {
    pub vehicle_id: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub name: String,
    pub number: String,
    pub driver: String,
    pub refuel: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Machinery {
    pub machinery_id: String,
    pub code: String,
    #[serde(rename = "type")]
    pub machinery_type: String,
    pub user: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OtherMachinery {
    pub machinery_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub machinery_type: String,
    pub user: String,
    pub refuel: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeaseMachine {
    pub category: String,
    #[serde(rename = "type")]
    pub machine_type: String,
    pub driver: String,
    pub count: String,
    pub company: String,
}

/// 危険予知 (hazard prediction) checklist item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KyActivity {
    pub hazard: String,
    pub countermeasure: String,
    pub checked: bool,
}

const KY_ACTIVITIES: [(&str, &str); 10] = [
    ("飛び石による事故", "養生の徹底"),
    ("使用機械によるケガ", "保護具の装着"),
    ("通行人との接触", "声がけ・周囲確認"),
    ("法面からの滑落", "足元確認"),
    ("高所からの落下", "フルハーネスの装着"),
    ("電線等の切断", "目視確認・慎重な作業"),
    ("伐採木による事故", "伐倒方向の確認"),
    ("玉掛ミスによる事故", "有資格者による操作"),
    ("機械操縦ミスによる事故", "手順の確認"),
    ("高所作業車の墜転", "アウトリガー確認等"),
];

/// The standard checklist, all unchecked
pub fn default_ky_activities() -> Vec<KyActivity> {
    KY_ACTIVITIES
        .iter()
        .map(|(hazard, countermeasure)| KyActivity {
            hazard: hazard.to_string(),
            countermeasure: countermeasure.to_string(),
            checked: false,
        })
        .collect()
}

fn default_start_time() -> String {
    "08:30".to_string()
}

fn default_end_time() -> String {
    "17:00".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstructionDailyReport {
    pub report_date: NaiveDate,
    pub site_name: String,
    #[serde(default)]
    pub work_location: String,
    #[serde(default)]
    pub work_content: String,
    #[serde(default)]
    pub early_start: String,
    #[serde(default = "default_start_time")]
    pub work_start_time: String,
    #[serde(default = "default_end_time")]
    pub work_end_time: String,
    #[serde(default)]
    pub overtime: String,
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub own_vehicles: Vec<OwnVehicle>,
    #[serde(default)]
    pub machinery: Vec<Machinery>,
    #[serde(default)]
    pub other_machinery: Vec<OtherMachinery>,
    #[serde(default)]
    pub lease_machines: Vec<LeaseMachine>,
    #[serde(default)]
    pub other_materials: String,
    #[serde(default = "default_ky_activities")]
    pub ky_activities: Vec<KyActivity>,
    #[serde(default)]
    pub customer_requests: String,
    #[serde(default)]
    pub office_confirmation: String,
}

impl ConstructionDailyReport {
    /// A blank report with the default foreman row and KY checklist
    pub fn new(report_date: NaiveDate, site_name: impl Into<String>) -> Self {
        Self {
            report_date,
            site_name: site_name.into(),
            work_location: String::new(),
            work_content: String::new(),
            early_start: String::new(),
            work_start_time: default_start_time(),
            work_end_time: default_end_time(),
            overtime: String::new(),
            workers: vec![Worker {
                category: "世話役".to_string(),
                name: String::new(),
            }],
            own_vehicles: Vec::new(),
            machinery: Vec::new(),
            other_machinery: Vec::new(),
            lease_machines: Vec::new(),
            other_materials: String::new(),
            ky_activities: default_ky_activities(),
            customer_requests: String::new(),
            office_confirmation: String::new(),
        }
    }
}

// ============================================================================
// Sum type and serializers
// ============================================================================

/// A creation payload for any request kind.
///
/// Read from JSON with a `kind` tag, e.g. `{"kind": "leave", ...}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    Leave(LeaveRequest),
    Overtime(OvertimeRequest),
    HolidayWork(HolidayWorkRequest),
    Expense(ExpenseRequest),
    Reimbursement(ReimbursementRequest),
    Settlement(SettlementRequest),
    ConstructionDaily(ConstructionDailyReport),
}

/// Common `request` header of the nested shapes
#[derive(Debug, Serialize)]
struct RequestHeader {
    title: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct LeaveBody<'a> {
    request: RequestHeader,
    leave_request: &'a LeaveRequest,
}

#[derive(Debug, Serialize)]
struct OvertimeBody<'a> {
    request: RequestHeader,
    overtime_request: &'a OvertimeRequest,
}

#[derive(Debug, Serialize)]
struct ExpenseDetail<'a> {
    expense_type: ExpenseType,
    purpose: &'a str,
    total_amount: i64,
    vendor: Option<&'a str>,
    occurred_date: Option<NaiveDate>,
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ExpenseBody<'a> {
    request: RequestHeader,
    expense_request: ExpenseDetail<'a>,
    expense_lines: &'a [ExpenseLine],
}

#[derive(Debug, Serialize)]
struct SettlementDetail<'a> {
    expense_type: ExpenseType,
    advance_payment_request_id: &'a str,
    settlement_date: NaiveDate,
    advance_payment_amount: i64,
    total_amount: i64,
    balance_amount: i64,
    applicant_name: &'a str,
    site_name: &'a str,
    application_date: Option<NaiveDate>,
    received_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct SettlementBody<'a> {
    request: RequestHeader,
    expense_request: SettlementDetail<'a>,
    expense_lines: &'a [ReceiptLine],
}

#[derive(Debug, Serialize)]
struct HolidayWorkBody<'a> {
    holiday_work_request: &'a HolidayWorkRequest,
}

#[derive(Debug, Serialize)]
struct ReimbursementBody<'a> {
    #[serde(flatten)]
    request: &'a ReimbursementRequest,
    total_amount: i64,
}

impl RequestPayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Leave(_) => RequestType::Leave,
            Self::Overtime(_) => RequestType::Overtime,
            Self::HolidayWork(_) => RequestType::HolidayWork,
            Self::Expense(_) => RequestType::Expense,
            Self::Reimbursement(_) => RequestType::Reimbursement,
            Self::Settlement(_) => RequestType::Settlement,
            Self::ConstructionDaily(_) => RequestType::ConstructionDaily,
        }
    }

    /// Creation endpoint path
    pub fn endpoint(&self) -> String {
        let segment = self
            .request_type()
            .endpoint_segment()
            .unwrap_or("expense");
        format!("/api/v1/requests/{}", segment)
    }

    /// Client-side checks run before any network call
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = ValidationErrorBuilder::new();

        match self {
            Self::Leave(leave) => {
                errors.check(
                    "end_date",
                    validate_date_range(leave.start_date, leave.end_date),
                );
                errors.check("days", validate_quantity(leave.days));
                if let Some(hours) = leave.hours {
                    errors.check("hours", validate_quantity(hours));
                }
            }
            Self::Overtime(overtime) => {
                errors.check("start_time", validate_time(&overtime.start_time));
                errors.check("end_time", validate_time(&overtime.end_time));
                errors.check("break_time", validate_quantity(overtime.break_time));
                errors.check("total_hours", validate_quantity(overtime.total_hours));
            }
            Self::HolidayWork(work) => {
                if work.compensatory_leave == CompensatoryLeave::Yes
                    && work.compensatory_leave_date.is_none()
                {
                    errors.add("compensatory_leave_date", "必須項目です");
                }
            }
            Self::Expense(expense) => {
                errors.check("purpose", validate_required(&expense.purpose));
                match expense.total() {
                    Ok(total) => {
                        errors.check("total_amount", validate_amount(total));
                    }
                    Err(_) => {
                        errors.add("total_amount", TOTAL_TOO_LARGE);
                    }
                }
                if matches!(
                    expense.expense_type,
                    ExpenseType::Settlement | ExpenseType::Unknown
                ) {
                    errors.add("expense_type", "仮払金申請または立替金申請を選択してください");
                }
                for (i, line) in expense.expense_lines.iter().enumerate() {
                    errors.check(
                        &format!("expense_lines[{}].amount", i),
                        validate_amount(line.amount),
                    );
                }
            }
            Self::Reimbursement(reimbursement) => {
                errors.check(
                    "applicant_name",
                    validate_required(&reimbursement.applicant_name),
                );
                check_receipt_lines(&mut errors, &reimbursement.expense_lines);
                if reimbursement.total().is_err() {
                    errors.add("total_amount", TOTAL_TOO_LARGE);
                }
            }
            Self::Settlement(settlement) => {
                if settlement.advance_payment_request_id.trim().is_empty() {
                    errors.add("advance_payment_request_id", "仮払金申請を選択してください");
                }
                errors.check(
                    "advance_payment_amount",
                    validate_amount(settlement.advance_payment_amount),
                );
                check_receipt_lines(&mut errors, &settlement.expense_lines);
                if settlement.total().is_err() {
                    errors.add("total_amount", TOTAL_TOO_LARGE);
                } else if settlement.balance().is_err() {
                    errors.add("balance_amount", TOTAL_TOO_LARGE);
                }
            }
            Self::ConstructionDaily(report) => {
                errors.check("site_name", validate_required(&report.site_name));
                errors.check("work_start_time", validate_time(&report.work_start_time));
                errors.check("work_end_time", validate_time(&report.work_end_time));
                if !report.workers.iter().any(|w| !w.name.trim().is_empty()) {
                    errors.add("workers", "作業員を1名以上入力してください");
                }
            }
        }

        errors.finish()
    }

    /// Serialize into the backend's expected body shape
    pub fn to_body(&self) -> Result<serde_json::Value, ApiError> {
        let value = match self {
            Self::Leave(leave) => serde_json::to_value(LeaveBody {
                request: RequestHeader {
                    title: format!("休暇申請 ({} - {})", leave.start_date, leave.end_date),
                    description: leave.reason.clone().unwrap_or_default(),
                },
                leave_request: leave,
            }),
            Self::Overtime(overtime) => serde_json::to_value(OvertimeBody {
                request: RequestHeader {
                    title: format!("時間外労働申請 ({})", overtime.work_date),
                    description: overtime.reason.clone().unwrap_or_default(),
                },
                overtime_request: overtime,
            }),
            Self::Expense(expense) => {
                let purpose = if expense.purpose.trim().is_empty() {
                    "経費精算"
                } else {
                    expense.purpose.as_str()
                };
                serde_json::to_value(ExpenseBody {
                    request: RequestHeader {
                        title: format!("経費申請 - {}", purpose),
                        description: expense.description.clone().unwrap_or_default(),
                    },
                    expense_request: ExpenseDetail {
                        expense_type: expense.expense_type,
                        purpose: &expense.purpose,
                        total_amount: expense.total()?,
                        vendor: expense.vendor.as_deref(),
                        occurred_date: expense.occurred_date,
                        description: expense.description.as_deref(),
                    },
                    expense_lines: &expense.expense_lines,
                })
            }
            Self::Settlement(settlement) => serde_json::to_value(SettlementBody {
                request: RequestHeader {
                    title: format!("仮払金精算 ({})", settlement.settlement_date),
                    description: settlement.site_name.clone(),
                },
                expense_request: SettlementDetail {
                    expense_type: ExpenseType::Settlement,
                    advance_payment_request_id: &settlement.advance_payment_request_id,
                    settlement_date: settlement.settlement_date,
                    advance_payment_amount: settlement.advance_payment_amount,
                    total_amount: settlement.total()?,
                    balance_amount: settlement.balance()?,
                    applicant_name: &settlement.applicant_name,
                    site_name: &settlement.site_name,
                    application_date: settlement.application_date,
                    received_date: settlement.received_date,
                },
                expense_lines: &settlement.expense_lines,
            }),
            Self::HolidayWork(work) => serde_json::to_value(HolidayWorkBody {
                holiday_work_request: work,
            }),
            Self::Reimbursement(reimbursement) => serde_json::to_value(ReimbursementBody {
                request: reimbursement,
                total_amount: reimbursement.total()?,
            }),
            Self::ConstructionDaily(report) => serde_json::to_value(report),
        }?;

        Ok(value)
    }
}

fn check_receipt_lines(errors: &mut ValidationErrorBuilder, lines: &[ReceiptLine]) {
    if lines.is_empty() {
        errors.add("expense_lines", "明細を1行以上入力してください");
    }
    for (i, line) in lines.iter().enumerate() {
        errors.check(
            &format!("expense_lines[{}].item", i),
            validate_required(&line.item),
        );
        errors.check(
            &format!("expense_lines[{}].amount", i),
            validate_amount(line.amount),
        );
    }
}
