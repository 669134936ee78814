//! The worker thread and the inline path must produce identical bytes for
//! every lab operation.

use std::borrow::Cow;

use chairside::background::handle_request;
use chairside::lab::{DeliveryKind, DeliveryStatus, LabFilter, LabRequest, LabStatus};
use chairside::{BackgroundShim, WorkerRequest, WorkerResponse};
use chrono::{Duration, Local, NaiveDate};
use demo_data::LAB_REQUESTS;

fn fixture_requests() -> Vec<LabRequest> {
    LAB_REQUESTS
        .iter()
        .map(|r| serde_json::from_value(serde_json::to_value(r).unwrap()).unwrap())
        .collect()
}

fn boundary_requests(today: NaiveDate) -> Vec<LabRequest> {
    let expected = [
        ("past", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        ("today", today),
        ("future", NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()),
    ];
    expected
        .into_iter()
        .map(|(id, date)| LabRequest {
            id: id.to_string(),
            patient_id: "p-001".to_string(),
            patient_name: "Ahmad Ali".to_string(),
            lab_name: "Smile Lab".to_string(),
            work_type: "Zirconia crown".to_string(),
            status: LabStatus::Sent,
            sent_date: Some(NaiveDate::from_ymd_opt(2023, 12, 20).unwrap()),
            expected_return_date: Some(date),
        })
        .collect()
}

fn all_operations(requests: Vec<LabRequest>, today: NaiveDate) -> Vec<WorkerRequest<'static>> {
    vec![
        WorkerRequest::CalculateDeliveryStatus {
            requests: requests.clone().into(),
            today,
        },
        WorkerRequest::CalculateOverdueBuckets {
            requests: requests.clone().into(),
            today,
        },
        WorkerRequest::FilterAndPaginate {
            requests: requests.clone().into(),
            filter: Cow::Owned(LabFilter::default()),
            page: 1,
            page_size: 4,
            today,
        },
        WorkerRequest::FilterAndPaginate {
            requests: requests.into(),
            filter: Cow::Owned(LabFilter {
                delivery: Some(DeliveryKind::Overdue),
                text: Some("lab".to_string()),
                ..Default::default()
            }),
            page: 2,
            page_size: 1,
            today,
        },
    ]
}

async fn assert_paths_agree(shim: &BackgroundShim, request: WorkerRequest<'_>) -> WorkerResponse {
    let from_worker = shim.run(request.clone()).await;
    let inline = handle_request(request);
    assert_eq!(
        serde_json::to_vec(&from_worker).unwrap(),
        serde_json::to_vec(&inline).unwrap(),
        "worker and inline disagree for {}",
        inline.tag()
    );
    from_worker
}

#[tokio::test]
async fn test_boundary_dates_classify_identically() {
    let today = Local::now().date_naive();
    let shim = BackgroundShim::spawn();

    let response = assert_paths_agree(
        &shim,
        WorkerRequest::CalculateDeliveryStatus {
            requests: boundary_requests(today).into(),
            today,
        },
    )
    .await;
    assert!(!shim.is_degraded());

    let WorkerResponse::DeliveryStatusCalculated(statuses) = response else {
        panic!("unexpected reply {:?}", response);
    };
    assert!(matches!(statuses[0].status, DeliveryStatus::Overdue { days } if days > 0));
    assert_eq!(statuses[1].status, DeliveryStatus::DueToday);
    assert!(matches!(statuses[2].status, DeliveryStatus::Remaining { days } if days > 0));
}

#[tokio::test]
async fn test_every_operation_agrees_on_fixtures() {
    let shim = BackgroundShim::spawn();
    let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    for request in all_operations(fixture_requests(), today) {
        assert_paths_agree(&shim, request).await;
    }
    assert!(shim.uses_worker());
}

#[tokio::test]
async fn test_fixture_buckets() {
    let shim = BackgroundShim::spawn();
    let today = NaiveDate::from_ymd_opt(2024, 5, 25).unwrap();
    let requests = fixture_requests();
    let buckets = shim.overdue_buckets(&requests, today).await;
    // lab-005 is 5 days late, lab-001 far beyond a week
    assert_eq!(buckets.this_week, vec!["lab-005"]);
    assert_eq!(buckets.critical, vec!["lab-001"]);
    assert!(buckets.recent.is_empty());
    assert!(buckets.due_today.is_empty());
}

#[tokio::test]
async fn test_unavailable_worker_gives_same_answers() {
    let today = Local::now().date_naive();
    let worker = BackgroundShim::spawn();
    let inline = BackgroundShim::unavailable();

    for request in all_operations(boundary_requests(today), today) {
        let a = worker.run(request.clone()).await;
        let b = inline.run(request).await;
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}

#[tokio::test]
async fn test_degraded_shim_keeps_answering() {
    let shim = BackgroundShim::spawn_with(|_| panic!("worker crashed"));
    let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap() + Duration::days(1);

    for request in all_operations(fixture_requests(), today) {
        assert_paths_agree(&shim, request).await;
    }
    assert!(shim.is_degraded());
}
