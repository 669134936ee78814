//! Shared demo data for benchmarks, tests and the perf dataset generator.
//!
//! Fixtures are small CSV files embedded at compile time. Larger collections
//! come from `synthetic_patients`, which is seeded so benchmark runs compare
//! like with like.

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoPatient {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Unix millis; absent for imported records
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoAppointment {
    pub id: String,
    pub patient_id: String,
    pub date: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoLabRequest {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub lab_name: String,
    pub work_type: String,
    pub status: String,
    pub sent_date: Option<String>,
    pub expected_return_date: Option<String>,
}

fn parse_csv<T: for<'de> Deserialize<'de>>(raw: &str) -> Vec<T> {
    csv::Reader::from_reader(raw.as_bytes())
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .expect("embedded demo CSV must parse")
}

pub static PATIENTS: Lazy<Vec<DemoPatient>> =
    Lazy::new(|| parse_csv(include_str!("../data/patients.csv")));

pub static APPOINTMENTS: Lazy<Vec<DemoAppointment>> =
    Lazy::new(|| parse_csv(include_str!("../data/appointments.csv")));

pub static LAB_REQUESTS: Lazy<Vec<DemoLabRequest>> =
    Lazy::new(|| parse_csv(include_str!("../data/lab_requests.csv")));

const FIRST_NAMES: &[&str] = &[
    "Ahmad", "Ali", "Sara", "Lina", "Omar", "Rania", "Yousef", "Hala", "Khaled", "Mona",
    "Tariq", "Dina", "Fadi", "Noor", "Sami", "Layla", "Ziad", "Reem", "Bassam", "Huda",
];

const LAST_NAMES: &[&str] = &[
    "Ali", "Hassan", "Ahmad", "Khoury", "Haddad", "Saleh", "Nasser", "Mansour", "Odeh",
    "Qasem", "Shami", "Barakat", "Zoubi", "Tamimi", "Jaber", "Hijazi",
];

const STREETS: &[&str] = &[
    "Rainbow St", "Garden Rd", "Mecca St", "Hill Ave", "University St", "Market Sq",
    "Airport Rd", "Medina St",
];

const CITIES: &[&str] = &["Amman", "Irbid", "Zarqa", "Aqaba", "Salt", "Madaba"];

/// Generate `count` patients deterministically from `seed`.
pub fn synthetic_patients(count: usize, seed: u64) -> Vec<DemoPatient> {
    let mut rng = StdRng::seed_from_u64(seed);
    // 2024-01-01T00:00:00Z
    let base_millis: i64 = 1_704_067_200_000;

    (0..count)
        .map(|i| {
            let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
            let phone = format!("07{}{:07}", rng.gen_range(7..=9), rng.gen_range(0..10_000_000));
            let email = rng
                .gen_bool(0.7)
                .then(|| format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), i));
            let address = rng.gen_bool(0.8).then(|| {
                format!(
                    "{} {} {}",
                    rng.gen_range(1..200),
                    STREETS[rng.gen_range(0..STREETS.len())],
                    CITIES[rng.gen_range(0..CITIES.len())]
                )
            });
            let created_at = rng
                .gen_bool(0.95)
                .then(|| base_millis + rng.gen_range(0..365_i64) * 86_400_000);

            DemoPatient {
                id: format!("p-{:06}", i),
                name: format!("{} {}", first, last),
                phone,
                email,
                address,
                created_at,
            }
        })
        .collect()
}

/// Write a synthetic patient dataset as pretty JSON.
pub fn write_dataset(path: &Path, count: usize, seed: u64) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let patients = synthetic_patients(count, seed);
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &patients)?;
    Ok(())
}
