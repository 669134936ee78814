//! Lab-request computations: delivery status, overdue buckets and the
//! combined filter + paginate used by the lab screens.
//!
//! Everything here is a pure function of its inputs and an explicit `today`,
//! so the background worker and the synchronous path agree exactly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::fingerprint::Summarize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Pending,
    Sent,
    InProgress,
    Received,
    Delivered,
}

impl LabStatus {
    /// The work is back from the lab
    pub fn is_complete(self) -> bool {
        matches!(self, LabStatus::Received | LabStatus::Delivered)
    }

    fn as_str(self) -> &'static str {
        match self {
            LabStatus::Pending => "pending",
            LabStatus::Sent => "sent",
            LabStatus::InProgress => "in_progress",
            LabStatus::Received => "received",
            LabStatus::Delivered => "delivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabRequest {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub lab_name: String,
    pub work_type: String,
    pub status: LabStatus,
    #[serde(default)]
    pub sent_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_return_date: Option<NaiveDate>,
}

impl Summarize for LabRequest {
    fn summary(&self) -> String {
        let expected = self
            .expected_return_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        format!("{}-{}-{}-{}", self.id, self.patient_id, expected, self.status.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Unscheduled,
    Overdue { days: i64 },
    DueToday,
    Remaining { days: i64 },
}

/// `DeliveryStatus` without its day count, for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Delivered,
    Unscheduled,
    Overdue,
    DueToday,
    Remaining,
}

impl DeliveryStatus {
    pub fn kind(&self) -> DeliveryKind {
        match self {
            DeliveryStatus::Delivered => DeliveryKind::Delivered,
            DeliveryStatus::Unscheduled => DeliveryKind::Unscheduled,
            DeliveryStatus::Overdue { .. } => DeliveryKind::Overdue,
            DeliveryStatus::DueToday => DeliveryKind::DueToday,
            DeliveryStatus::Remaining { .. } => DeliveryKind::Remaining,
        }
    }
}

pub fn delivery_status(request: &LabRequest, today: NaiveDate) -> DeliveryStatus {
    if request.status.is_complete() {
        return DeliveryStatus::Delivered;
    }
    let Some(expected) = request.expected_return_date else {
        return DeliveryStatus::Unscheduled;
    };
    let days = (expected - today).num_days();
    match days.cmp(&0) {
        Ordering::Less => DeliveryStatus::Overdue { days: -days },
        Ordering::Equal => DeliveryStatus::DueToday,
        Ordering::Greater => DeliveryStatus::Remaining { days },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDeliveryStatus {
    pub id: String,
    pub status: DeliveryStatus,
}

/// Status of every request, in input order
pub fn delivery_statuses(requests: &[LabRequest], today: NaiveDate) -> Vec<RequestDeliveryStatus> {
    requests
        .iter()
        .map(|r| RequestDeliveryStatus {
            id: r.id.clone(),
            status: delivery_status(r, today),
        })
        .collect()
}

/// Ids of outstanding requests grouped by how late they are
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueBuckets {
    /// 1 to 3 days late
    pub recent: Vec<String>,
    /// 4 to 7 days late
    pub this_week: Vec<String>,
    /// More than a week late
    pub critical: Vec<String>,
    pub due_today: Vec<String>,
}

pub fn overdue_buckets(requests: &[LabRequest], today: NaiveDate) -> OverdueBuckets {
    let mut recent = Vec::new();
    let mut this_week = Vec::new();
    let mut critical = Vec::new();
    let mut due_today = Vec::new();

    for request in requests {
        match delivery_status(request, today) {
            DeliveryStatus::Overdue { days } => {
                let bucket = match days {
                    1..=3 => &mut recent,
                    4..=7 => &mut this_week,
                    _ => &mut critical,
                };
                bucket.push((days, request.id.clone()));
            }
            DeliveryStatus::DueToday => due_today.push(request.id.clone()),
            _ => {}
        }
    }

    let latest_first = |mut bucket: Vec<(i64, String)>| {
        bucket.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        bucket.into_iter().map(|(_, id)| id).collect::<Vec<_>>()
    };
    due_today.sort();

    OverdueBuckets {
        recent: latest_first(recent),
        this_week: latest_first(this_week),
        critical: latest_first(critical),
        due_today,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabFilter {
    pub status: Option<LabStatus>,
    pub delivery: Option<DeliveryKind>,
    /// Case-insensitive substring over id, patient, lab and work type
    pub text: Option<String>,
}

impl LabFilter {
    pub fn matches(&self, request: &LabRequest, today: NaiveDate) -> bool {
        if self.status.is_some_and(|s| s != request.status) {
            return false;
        }
        if self
            .delivery
            .is_some_and(|kind| delivery_status(request, today).kind() != kind)
        {
            return false;
        }
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let needle = text.to_lowercase();
                [
                    &request.id,
                    &request.patient_name,
                    &request.lab_name,
                    &request.work_type,
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches before paging
    pub total: usize,
    /// 1-based
    pub page: usize,
    pub page_count: usize,
}

/// Filter, sort by expected return date (unscheduled last, ties by id) and
/// cut out one page. Page 0 is read as page 1; a page size of 0 as 1.
pub fn filter_and_paginate(
    requests: &[LabRequest],
    filter: &LabFilter,
    page: usize,
    page_size: usize,
    today: NaiveDate,
) -> Page<LabRequest> {
    let page = page.max(1);
    let page_size = page_size.max(1);

    let mut matching: Vec<&LabRequest> = requests.iter().filter(|r| filter.matches(r, today)).collect();
    matching.sort_by(|a, b| {
        let by_date = match (a.expected_return_date, b.expected_return_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_date.then_with(|| a.id.cmp(&b.id))
    });

    let total = matching.len();
    let page_count = total.div_ceil(page_size);
    let items = matching
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    Page {
        items,
        total,
        page,
        page_count,
    }
}
