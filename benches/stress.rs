use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use venuebook::booking::{AvailabilityChecker, BookingCommitter, BookingError};
use venuebook::engine::Engine;
use venuebook::model::*;
use venuebook::notify::NotifyHub;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn date(i: usize) -> DayKey {
    // 28 days per month keeps every key valid.
    let month = 1 + (i / 28) % 12;
    let year = 2025 + i / (28 * 12);
    DayKey::parse(&format!("{year}-{month:02}-{:02}", 1 + i % 28)).unwrap()
}

fn hour_slot(h: u16) -> Slot {
    Slot::new(TimeOfDay::hm(h, 0).unwrap(), TimeOfDay::hm(h + 1, 0).unwrap())
}

fn draft(venue_id: Ulid, date: DayKey, slot: Slot) -> ReservationDraft {
    ReservationDraft {
        venue_id,
        date,
        slot,
        title: "Load test".into(),
        description: "stress".into(),
        registration_link: "https://example.com".into(),
    }
}

fn setup(n_venues: usize) -> (Arc<Engine>, Vec<Ulid>) {
    let dir = std::env::temp_dir().join(format!("venuebook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let venues: Vec<Venue> = (0..n_venues)
        .map(|i| Venue {
            id: Ulid::new(),
            name: format!("Room {i}"),
            capacity: 50,
            description: String::new(),
        })
        .collect();
    let ids = venues.iter().map(|v| v.id).collect();
    let engine = Engine::new(dir.join("bench.wal"), venues, Arc::new(NotifyHub::new())).unwrap();
    println!("  created {n_venues} venues in {}", dir.display());
    (Arc::new(engine), ids)
}

async fn phase1_sequential(committer: &BookingCommitter<Engine>, venue: Ulid) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    let owner = OwnerId::new("bench");

    for i in 0..n {
        let d = draft(venue, date(i / 24), hour_slot((i % 24) as u16));
        let t = Instant::now();
        committer.commit_booking(d, Some(owner.clone())).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("commit latency", &mut latencies);
}

async fn phase2_concurrent(committer: Arc<BookingCommitter<Engine>>, venues: &[Ulid]) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let committer = committer.clone();
        let venue = venues[i % venues.len()];
        handles.push(tokio::spawn(async move {
            let owner = OwnerId::new(format!("task-{i}"));
            for j in 0..n_per_task {
                // Offset dates per task so tasks sharing a venue never collide.
                let d = draft(venue, date(1000 + i * 20 + j / 24), hour_slot((j % 24) as u16));
                committer.commit_booking(d, Some(owner.clone())).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contended(committer: Arc<BookingCommitter<Engine>>, venue: Ulid) {
    let rounds = 100;
    let contenders = 16;
    let mut double_bookings = 0;

    let start = Instant::now();
    for round in 0..rounds {
        let mut handles = Vec::new();
        for c in 0..contenders {
            let committer = committer.clone();
            let d = draft(venue, date(3000 + round), hour_slot(12));
            handles.push(tokio::spawn(async move {
                committer.commit_booking(d, Some(OwnerId::new(format!("c{c}")))).await
            }));
        }
        let mut wins = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => wins += 1,
                Err(BookingError::Conflict { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        if wins != 1 {
            double_bookings += 1;
        }
    }
    println!(
        "  {rounds} rounds x {contenders} contenders in {:.2}s, rounds without exactly one winner: {double_bookings}",
        start.elapsed().as_secs_f64()
    );
}

async fn phase4_reads_under_load(engine: Arc<Engine>, committer: Arc<BookingCommitter<Engine>>, venue: Ulid) {
    let stop = Arc::new(AtomicBool::new(false));
    let writes = Arc::new(AtomicUsize::new(0));

    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let committer = committer.clone();
        let stop = stop.clone();
        let writes = writes.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                let d = draft(venue, date(4000 + w * 500 + i / 24), hour_slot((i % 24) as u16));
                if committer.commit_booking(d, Some(OwnerId::new("writer"))).await.is_ok() {
                    writes.fetch_add(1, Ordering::Relaxed);
                }
                i += 1;
            }
        }));
    }

    let checker = AvailabilityChecker::new(engine);
    let mut reader_handles = Vec::new();
    for r in 0..10 {
        let checker = checker.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(500);
            for i in 0..500 {
                let t = Instant::now();
                checker
                    .check_availability(venue, &date(4000 + (r * 37 + i) % 2500), hour_slot(9))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in reader_handles {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }
    println!("  background writes committed: {}", writes.load(Ordering::Relaxed));
    print_latency("availability check", &mut all);
}

#[tokio::main]
async fn main() {
    println!("=== venuebook stress benchmark ===\n");

    println!("[setup]");
    let (engine, venues) = setup(10);
    let committer = Arc::new(BookingCommitter::new(engine.clone()));

    println!("\n[phase 1] sequential commit throughput");
    phase1_sequential(&committer, venues[0]).await;

    println!("\n[phase 2] concurrent commit throughput");
    phase2_concurrent(committer.clone(), &venues[1..]).await;

    println!("\n[phase 3] contended slot");
    phase3_contended(committer.clone(), venues[0]).await;

    println!("\n[phase 4] availability checks under write load");
    phase4_reads_under_load(engine.clone(), committer, venues[9]).await;

    println!("\n[compaction]");
    let t = Instant::now();
    engine.compact_wal().await.unwrap();
    println!(
        "  compacted {} reservations in {:.2}ms",
        engine.reservation_count(),
        t.elapsed().as_secs_f64() * 1000.0
    );
}
